use dvault_crypto::{compute_hmac, content_hash, decrypt, encrypt, HmacKey};

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

#[divan::bench(args = [1024, 65536, 1048576, 5242880])]
fn bench_encrypt(bencher: divan::Bencher, size: usize) {
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| encrypt(divan::black_box(&data)).unwrap());
}

#[divan::bench(args = [1024, 65536, 1048576, 5242880])]
fn bench_decrypt(bencher: divan::Bencher, size: usize) {
    let data = make_data(size);
    let sealed = encrypt(&data).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            decrypt(
                divan::black_box(&sealed.ciphertext),
                sealed.key.as_bytes(),
                &sealed.nonce,
                &sealed.tag,
            )
            .unwrap()
        });
}

#[divan::bench(args = [1024, 1048576])]
fn bench_hmac(bencher: divan::Bencher, size: usize) {
    let data = make_data(size);
    let key = HmacKey::generate();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| compute_hmac(divan::black_box(&data), key.as_bytes()).unwrap());
}

#[divan::bench(args = [1024, 1048576])]
fn bench_content_hash(bencher: divan::Bencher, size: usize) {
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| content_hash(divan::black_box(&data)));
}

fn main() {
    divan::main();
}
