// Block cipher modes used by the toy oracle.
//
// CTR and CFB both run the cipher forwards and XOR, so one counter-reuse
// between them hands out keystream:
//
//     CTR:  C_i = P_i ⊕ E(nonce|ctr_i)
//     CFB:  P_j = C_j ⊕ E(C_{j-1})
//
// Feed CFB the block `nonce|ctr_i` followed by C_i and the second output block
// is exactly P_i. CBC decryption runs the cipher backwards:
//
//     CBC:  P_j = D(C_j) ⊕ C_{j-1}
//
// so a zero block followed by a guess K decrypts to D(K), which equals
// `nonce|ctr_i` only when K is the keystream block E(nonce|ctr_i).
use crate::aes::{AesCipher, BLOCK_SIZE};
use crate::layout::NONCE_SIZE;
use crate::xor::xor_block;
use crate::{Error, Result};

pub fn counter_block(nonce: &[u8; NONCE_SIZE], counter: u32) -> [u8; BLOCK_SIZE] {
    let mut block = [0u8; BLOCK_SIZE];
    block[..NONCE_SIZE].copy_from_slice(nonce);
    block[NONCE_SIZE..].copy_from_slice(&counter.to_be_bytes());
    block
}

/// AES-128 in counter mode with a 12 byte nonce and a 32 bit big-endian
/// counter. Encryption and decryption are the same operation.
pub fn aes_128_ctr(
    message: &[u8],
    key: &[u8; BLOCK_SIZE],
    nonce: &[u8; NONCE_SIZE],
    initial_counter: u32,
) -> Vec<u8> {
    let cipher = AesCipher::new(key);
    let mut output = Vec::with_capacity(message.len());
    for (counter, message_block) in (initial_counter..).zip(message.chunks(BLOCK_SIZE)) {
        let key_stream = cipher.encrypt_block(counter_block(nonce, counter));
        output.extend(message_block.iter().zip(key_stream).map(|(m, k)| m ^ k));
    }
    output
}

/// CBC decryption without any padding removal.
pub fn decrypt_aes_128_cbc_raw(
    ciphertext: &[u8],
    key: &[u8; BLOCK_SIZE],
    iv: &[u8; BLOCK_SIZE],
) -> Result<Vec<u8>> {
    let blocks = whole_blocks(ciphertext)?;
    let cipher = AesCipher::new(key);
    let mut message = Vec::with_capacity(ciphertext.len());
    let mut last_block = *iv;
    for block in blocks {
        message.extend_from_slice(&xor_block(&cipher.decrypt_block(block), &last_block));
        last_block = block;
    }
    Ok(message)
}

/// Full-block CFB decryption.
pub fn decrypt_aes_128_cfb(
    ciphertext: &[u8],
    key: &[u8; BLOCK_SIZE],
    iv: &[u8; BLOCK_SIZE],
) -> Result<Vec<u8>> {
    let blocks = whole_blocks(ciphertext)?;
    let cipher = AesCipher::new(key);
    let mut message = Vec::with_capacity(ciphertext.len());
    let mut last_block = *iv;
    for block in blocks {
        message.extend_from_slice(&xor_block(&block, &cipher.encrypt_block(last_block)));
        last_block = block;
    }
    Ok(message)
}

fn whole_blocks(data: &[u8]) -> Result<Vec<[u8; BLOCK_SIZE]>> {
    if data.len() % BLOCK_SIZE != 0 {
        return Err(Error::InvalidCiphertext(format!(
            "length {} is not a multiple of {BLOCK_SIZE}",
            data.len()
        )));
    }
    Ok(data
        .chunks_exact(BLOCK_SIZE)
        .map(|chunk| {
            let mut block = [0u8; BLOCK_SIZE];
            block.copy_from_slice(chunk);
            block
        })
        .collect())
}
