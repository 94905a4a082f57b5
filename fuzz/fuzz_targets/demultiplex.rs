#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(mut reader) = rngzip::multiplex::MultiplexReader::new(data) {
        let mut buf = [0u8; 256];
        for id in [2u8, 0, 1] {
            while let Ok(n) = reader.read_stream(id, &mut buf) {
                if n == 0 {
                    break;
                }
            }
        }
    }
});
