//! Fixtures shared by unit tests.

use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;
use std::path::Path;

const WAV_SPEC: WavSpec = WavSpec {
    channels: 1,
    sample_rate: 8000,
    bits_per_sample: 16,
    sample_format: SampleFormat::Int,
};

/// Write a short 8 kHz mono 16-bit PCM WAV. `seed` varies the samples so
/// different fixtures have different bytes.
pub fn write_wav(path: &Path, seed: u8) {
    std::fs::write(path, wav_bytes(seed)).unwrap();
}

/// 100 ms of a seeded sawtooth, as WAV file bytes.
pub fn wav_bytes(seed: u8) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    let mut writer = WavWriter::new(&mut buf, WAV_SPEC).unwrap();
    for i in 0..800i32 {
        let sample = ((i * (seed as i32 + 1) * 37) % 2000 - 1000) as i16;
        writer.write_sample(sample).unwrap();
    }
    writer.finalize().unwrap();
    buf.into_inner()
}

/// Answer exactly one HTTP request on an ephemeral port with a canned
/// response. Returns the base URL (with trailing slash) and a handle yielding
/// the raw request text.
pub fn serve_once(
    status_line: &str,
    content_type: &str,
    body: Vec<u8>,
) -> (String, std::thread::JoinHandle<String>) {
    use std::io::{BufRead, BufReader, Read, Write};

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let mut response = format!(
        "HTTP/1.1 {status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )
    .into_bytes();
    response.extend_from_slice(&body);

    let handle = std::thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream);
        let mut request = String::new();
        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            if let Some((k, v)) = line.split_once(':') {
                if k.eq_ignore_ascii_case("content-length") {
                    content_length = v.trim().parse().unwrap();
                }
            }
            request.push_str(&line);
            if line == "\r\n" || line.is_empty() {
                break;
            }
        }
        let mut req_body = vec![0u8; content_length];
        reader.read_exact(&mut req_body).unwrap();
        request.push_str(&String::from_utf8_lossy(&req_body));

        let mut stream = reader.into_inner();
        stream.write_all(&response).unwrap();
        request
    });
    (format!("http://{addr}/"), handle)
}
