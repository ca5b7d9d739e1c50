use crate::{Error, Result};

pub fn xor_bytes(buf_a: &[u8], buf_b: &[u8]) -> Result<Vec<u8>> {
    if buf_a.len() != buf_b.len() {
        return Err(Error::LengthMismatch(buf_a.len(), buf_b.len()));
    }
    Ok(buf_a.iter().zip(buf_b.iter()).map(|(a, b)| a ^ b).collect())
}

/// XOR two whole blocks. Block keys, counters and plaintext blocks are all
/// fixed at 16 bytes, so this never needs to report a length mismatch.
pub fn xor_block(block_a: &[u8; 16], block_b: &[u8; 16]) -> [u8; 16] {
    let mut out = *block_a;
    out.iter_mut().zip(block_b).for_each(|(a, b)| *a ^= b);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn xor_streams() {
        let a = hex::decode("1c0111001f010100061a024b53535009181c").unwrap();
        let b = hex::decode("686974207468652062756c6c277320657965").unwrap();

        let xored = xor_bytes(&a, &b).unwrap();

        let expected = hex::decode("746865206b696420646f6e277420706c6179").unwrap();
        assert_eq!(xored, expected);
    }

    #[test]
    fn xor_bytes_rejects_unequal_lengths() {
        let result = xor_bytes(&[1, 2, 3], &[1, 2]);

        assert!(matches!(result, Err(Error::LengthMismatch(3, 2))));
    }

    #[test]
    fn xor_twice_with_same_bytes_is_identity() {
        let mut rng = StdRng::from_seed([101; 32]);
        for len in [0, 1, 14, 16, 33, 512] {
            let a: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            let b: Vec<u8> = (0..len).map(|_| rng.gen()).collect();

            let round_trip = xor_bytes(&xor_bytes(&a, &b).unwrap(), &b).unwrap();

            assert_eq!(round_trip, a);
        }
    }

    #[test]
    fn xor_block_matches_xor_bytes() {
        let mut rng = StdRng::from_seed([102; 32]);
        let a: [u8; 16] = rng.gen();
        let b: [u8; 16] = rng.gen();

        let block = xor_block(&a, &b);

        assert_eq!(block.to_vec(), xor_bytes(&a, &b).unwrap());
        assert_eq!(xor_block(&block, &b), a);
    }
}
