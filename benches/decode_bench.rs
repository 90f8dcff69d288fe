use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fsarc::format::{compress, encrypt, mainhead_key, Magic};
use fsarc::reader::{ArchiveReader, ReaderOptions};
use fsarc::writer::{BlockRecord, RecordWriter};
use fsarc::Dictionary;
use std::io::Cursor;

fn bench_dictionary(c: &mut Criterion) {
    let mut d = Dictionary::new();
    for key in 0..64u16 {
        d.insert_u64(0, key, key as u64 * 7919);
    }
    d.insert_string(1, mainhead_key::ARCHLABEL, "benchmark archive label");
    let area = d.encode().unwrap();

    c.bench_function("dico_decode_65_entries", |b| {
        b.iter(|| Dictionary::decode_entries(black_box(&area)).unwrap())
    });
}

fn bench_resync(c: &mut Criterion) {
    let mut bytes: Vec<u8> = (0..4 * 1024 * 1024u32).map(|i| (i % 13) as u8 + 0x80).collect();
    let mut w = RecordWriter::new(Vec::new());
    w.write_header(Magic::OBJECT, 1, 0, &Dictionary::new()).unwrap();
    bytes.extend_from_slice(&w.into_inner());

    c.bench_function("resync_over_4mb_garbage", |b| {
        b.iter(|| {
            let mut r = ArchiveReader::from_stream(Cursor::new(black_box(&bytes[..])), ReaderOptions::default());
            r.read_header(true).unwrap()
        })
    });
}

fn bench_blocks(c: &mut Criterion) {
    let payload = vec![42u8; 256 * 1024];
    let block = BlockRecord {
        stream_offset:         0,
        uncompressed_size:     payload.len() as u32,
        compressed_size:       payload.len() as u32,
        compression_algorithm: compress::NONE,
        encryption_algorithm:  encrypt::NONE,
    };
    let mut w = RecordWriter::new(Vec::new());
    for _ in 0..16 {
        w.write_block(1, 0, &block, &payload).unwrap();
    }
    let bytes = w.into_inner();

    c.bench_function("read_16_verified_256k_blocks", |b| {
        b.iter(|| {
            let mut r = ArchiveReader::from_stream(Cursor::new(black_box(&bytes[..])), ReaderOptions::default());
            for _ in 0..16 {
                let h = r.read_header(false).unwrap();
                r.read_block(&h.dico, false).unwrap();
            }
        })
    });
}

criterion_group!(benches, bench_dictionary, bench_resync, bench_blocks);
criterion_main!(benches);
