use ctrleak::aes::AesCipher;
use ctrleak::attack::BatchPlan;
use ctrleak::layout::{LEAKED_KEY_LEN, MAX_REQUEST_LEN, TRIAL_LEN};
use ctrleak::oracle::server::{FlawedOracle, Reply};

use criterion::{criterion_group, criterion_main, Criterion};

pub fn build_every_batch_for_one_block(c: &mut Criterion) {
    let partial = [0x5Au8; LEAKED_KEY_LEN];
    c.bench_function("batch_plan_full_block", |b| {
        b.iter(|| BatchPlan::new(&partial, MAX_REQUEST_LEN / TRIAL_LEN).count())
    });
}

pub fn aes_decrypt_block(c: &mut Criterion) {
    let cipher = AesCipher::new(b"YELLOW SUBMARINE");
    c.bench_function("aes_decrypt_block", |b| {
        b.iter(|| cipher.decrypt_block([0x42; 16]))
    });
}

pub fn confirm_one_batch(c: &mut Criterion) {
    let oracle = FlawedOracle::with_pin(*b"YELLOW SUBMARINE", [0; 12], &[7; 32]).unwrap();
    let partial = [0x5Au8; LEAKED_KEY_LEN];
    let batch = BatchPlan::new(&partial, MAX_REQUEST_LEN / TRIAL_LEN)
        .batch(0)
        .unwrap();
    let counter = [0u8; 16];
    c.bench_function("confirm_one_batch", |b| {
        b.iter(|| match oracle.respond(&batch.payload) {
            Reply::Decrypted(response) => batch.confirmed_key(&response, &counter).unwrap(),
            _ => None,
        })
    });
}

criterion_group!(
    benches,
    build_every_batch_for_one_block,
    aes_decrypt_block,
    confirm_one_batch,
);
criterion_main!(benches);
