//! Multiplexed block stream through the public API: several logical
//! streams, with and without channel filters, read back in any order.

use std::cell::RefCell;
use std::io::{Read, Write};
use std::rc::Rc;

use proptest::prelude::*;
use rngzip::compression::DataCompression;
use rngzip::multiplex::{MAGIC, MultiplexReader, MultiplexWriter, decode_block_header};
use rngzip::Error;

const CLIENT_MAGIC: u32 = 0x7465_7374;

fn payload(seed: u8, len: usize) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

#[test]
fn streams_written_interleaved_read_in_any_order() {
    let mut mux = MultiplexWriter::new(Vec::new(), CLIENT_MAGIC).unwrap().with_capacity(100);
    let streams: Vec<(u8, Vec<u8>)> = vec![(0, payload(1, 1000)), (3, payload(2, 333)), (63, payload(3, 50))];
    for chunk in 0..10 {
        for (id, data) in &streams {
            let step = data.len().div_ceil(10);
            let start = (chunk * step).min(data.len());
            let end = ((chunk + 1) * step).min(data.len());
            mux.write_stream(*id, &data[start..end]).unwrap();
        }
    }
    assert!(mux.blocks_written() > 3);
    let bytes = mux.finish().unwrap();
    assert_eq!(&bytes[..4], &MAGIC.to_be_bytes());

    let mut reader = MultiplexReader::new(&bytes[..]).unwrap();
    assert_eq!(reader.magic(), CLIENT_MAGIC);
    // Rückwärts lesen: Blöcke der anderen Streams werden zwischengespeichert.
    for (id, data) in streams.iter().rev() {
        let mut got = Vec::new();
        let mut buf = [0u8; 77];
        loop {
            let n = reader.read_stream(*id, &mut buf).unwrap();
            if n == 0 {
                break;
            }
            got.extend_from_slice(&buf[..n]);
        }
        assert_eq!(&got, data, "stream {id}");
    }
}

#[test]
fn filtered_channels_share_one_stream() {
    let text = b"<card><name>x</name></card>".repeat(300);
    let bits = payload(9, 5000);

    let mux = Rc::new(RefCell::new(MultiplexWriter::new(Vec::new(), CLIENT_MAGIC).unwrap().with_capacity(512)));
    let mut tree = DataCompression::Bzip2.encoder(MultiplexWriter::open(&mux, 0).unwrap());
    let mut data = DataCompression::Ppm5.encoder(MultiplexWriter::open(&mux, 2).unwrap());
    for (t, d) in bits.chunks(100).zip(text.chunks(100)) {
        tree.write_all(t).unwrap();
        data.write_all(d).unwrap();
    }
    tree.finish().unwrap();
    data.finish().unwrap();
    let bytes = Rc::into_inner(mux).expect("all stream handles dropped").into_inner().finish().unwrap();

    let mux = Rc::new(RefCell::new(MultiplexReader::new(&bytes[..]).unwrap()));
    let mut out_data = Vec::new();
    DataCompression::Ppm5.decoder(MultiplexReader::open(&mux, 2).unwrap()).read_to_end(&mut out_data).unwrap();
    let mut out_bits = Vec::new();
    DataCompression::Bzip2.decoder(MultiplexReader::open(&mux, 0).unwrap()).read_to_end(&mut out_bits).unwrap();
    assert_eq!(out_data, text);
    assert_eq!(out_bits, bits);
}

#[test]
fn wrong_magic() {
    assert!(matches!(MultiplexReader::new(&b"PK\x03\x04rest"[..]), Err(Error::BadMagic)));
    assert!(matches!(MultiplexReader::new(&b"Mu"[..]), Err(Error::BadMagic)));
}

#[test]
fn truncated_block_is_reported() {
    let mut mux = MultiplexWriter::new(Vec::new(), CLIENT_MAGIC).unwrap();
    mux.write_stream(1, &payload(0, 200)).unwrap();
    let bytes = mux.finish().unwrap();
    let cut = &bytes[..bytes.len() - 10];
    let mut reader = MultiplexReader::new(cut).unwrap();
    let mut buf = [0u8; 16];
    assert_eq!(reader.read_stream(1, &mut buf), Err(Error::TruncatedBlock { expected: 200 }));
}

#[test]
fn invalid_stream_id() {
    let mut mux = MultiplexWriter::new(Vec::new(), CLIENT_MAGIC).unwrap();
    assert_eq!(mux.write_stream(64, b"x"), Err(Error::InvalidBlockHeader));
}

proptest! {
    #[test]
    fn arbitrary_block_sequences(blocks in proptest::collection::vec((0u8..64, proptest::collection::vec(any::<u8>(), 1..300)), 1..20)) {
        let mut mux = MultiplexWriter::new(Vec::new(), CLIENT_MAGIC).unwrap().with_capacity(0);
        for (id, data) in &blocks {
            mux.write_stream(*id, data).unwrap();
        }
        let bytes = mux.finish().unwrap();

        // Jeder Block steht einzeln im Stream (Kapazität 0).
        let mut input = &bytes[8..];
        for (id, data) in &blocks {
            let header = decode_block_header(&mut input).unwrap();
            prop_assert_eq!(header, Some((*id, data.len())));
            input = &input[data.len()..];
        }
        prop_assert_eq!(decode_block_header(&mut input).unwrap(), None);
    }
}
