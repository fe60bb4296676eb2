//! Property and concurrency tests for the PCM ring buffer.

use std::io::Read;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use proptest::prelude::*;
use voicewire::FrameRingBuffer;
use voicewire::audio::{le_bytes_to_pcm16, pcm16_to_le_bytes};

fn arb_writes() -> impl Strategy<Value = Vec<Vec<u8>>> {
    proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..64), 0..32)
}

fn arb_read_sizes() -> impl Strategy<Value = Vec<usize>> {
    proptest::collection::vec(1usize..48, 1..16)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Reading back everything that was written yields the concatenation of
    /// the writes, whatever the read sizes.
    #[test]
    fn prop_reads_concatenate_writes(writes in arb_writes(), sizes in arb_read_sizes()) {
        let buffer = FrameRingBuffer::new();
        for w in &writes {
            buffer.write(w);
        }
        let expected: Vec<u8> = writes.concat();
        prop_assert_eq!(buffer.len(), expected.len());

        let mut out = Vec::new();
        let mut i = 0;
        while let Some(chunk) = buffer.try_read(sizes[i % sizes.len()]) {
            prop_assert!(chunk.len() <= sizes[i % sizes.len()]);
            out.extend_from_slice(&chunk);
            i += 1;
        }
        prop_assert_eq!(out, expected);
        prop_assert!(buffer.is_empty());
    }

    /// A bounded buffer holds the newest bytes, never more than the limit,
    /// and only ever discards whole samples.
    #[test]
    fn prop_limit_keeps_newest_bytes(writes in arb_writes(), limit in 1usize..128) {
        let buffer = FrameRingBuffer::with_limit(limit);
        for w in &writes {
            buffer.write(w);
        }
        let all: Vec<u8> = writes.concat();
        let effective = (limit & !1).max(2);
        let dropped = all.len().saturating_sub(effective).next_multiple_of(2);
        let kept = all.len() - dropped;

        prop_assert!(kept <= effective);
        prop_assert_eq!(buffer.len(), kept);
        prop_assert_eq!(buffer.dropped_bytes() as usize, dropped);

        let mut out = Vec::new();
        while let Some(chunk) = buffer.try_read(limit) {
            out.extend_from_slice(&chunk);
        }
        prop_assert_eq!(&out[..], &all[all.len() - kept..]);
    }

    /// Several writers with random record counts and one blocking reader with
    /// random read sizes: every byte arrives once and each writer's records stay
    /// in order.
    #[test]
    fn prop_concurrent_random_sizes_lose_nothing(
        record_lens in proptest::collection::vec(
            proptest::collection::vec(1usize..40, 1..40), 2..5),
        read_sizes in proptest::collection::vec(1usize..200, 1..8),
    ) {
        let buffer = Arc::new(FrameRingBuffer::new());
        let total: usize = record_lens.iter().flatten().sum();

        let writers: Vec<_> = record_lens
            .iter()
            .enumerate()
            .map(|(id, lens)| {
                let buffer = Arc::clone(&buffer);
                let lens = lens.clone();
                thread::spawn(move || {
                    for (seq, len) in lens.into_iter().enumerate() {
                        // Records are tagged so the reader can reassemble them.
                        let mut record = vec![id as u8, seq as u8, len as u8];
                        record.resize(3 + len, id as u8);
                        buffer.write(&record);
                    }
                })
            })
            .collect();

        let (tx, rx) = mpsc::channel();
        {
            let buffer = Arc::clone(&buffer);
            let expected = total + 3 * record_lens.iter().map(Vec::len).sum::<usize>();
            thread::spawn(move || {
                let mut out = Vec::with_capacity(expected);
                let mut i = 0;
                while out.len() < expected {
                    out.extend_from_slice(&buffer.read(read_sizes[i % read_sizes.len()]));
                    i += 1;
                }
                let _ = tx.send(out);
            });
        }

        for w in writers {
            w.join().unwrap();
        }
        let stream = rx
            .recv_timeout(Duration::from_secs(10))
            .expect("reader did not drain the buffer in time");

        // Writes are atomic, so the stream is a sequence of whole records.
        let mut next = vec![0usize; record_lens.len()];
        let mut pos = 0;
        while pos < stream.len() {
            let (id, seq, len) = (stream[pos] as usize, stream[pos + 1] as usize, stream[pos + 2] as usize);
            prop_assert_eq!(seq, next[id]);
            prop_assert_eq!(len, record_lens[id][seq]);
            prop_assert!(stream[pos + 3..pos + 3 + len].iter().all(|&b| b as usize == id));
            next[id] += 1;
            pos += 3 + len;
        }
        prop_assert_eq!(pos, stream.len());
        for (id, lens) in record_lens.iter().enumerate() {
            prop_assert_eq!(next[id], lens.len());
        }
    }
}

#[test]
fn test_odd_limit_preserves_sample_alignment() {
    let buffer = FrameRingBuffer::with_limit(5);
    buffer.write(&pcm16_to_le_bytes(&[300, 300, 300]));

    let kept = le_bytes_to_pcm16(&buffer.read(16)).unwrap();
    assert_eq!(kept, vec![300, 300]);
}

#[test]
fn test_read_zero_returns_empty_immediately() {
    let buffer = FrameRingBuffer::new();
    assert!(buffer.read(0).is_empty());
}

#[test]
fn test_blocked_reader_wakes_on_write() {
    let buffer = Arc::new(FrameRingBuffer::new());
    let reader = {
        let buffer = Arc::clone(&buffer);
        thread::spawn(move || buffer.read(16))
    };

    thread::sleep(Duration::from_millis(50));
    buffer.write(&[1, 2, 3]);

    let chunk = reader.join().unwrap();
    assert_eq!(&chunk[..], &[1, 2, 3]);
}

#[test]
fn test_read_timeout_expires_on_empty_buffer() {
    let buffer = FrameRingBuffer::new();
    assert!(buffer.read_timeout(16, Duration::from_millis(20)).is_none());

    buffer.write(&[9]);
    assert_eq!(&buffer.read_timeout(16, Duration::from_millis(20)).unwrap()[..], &[9]);
}

#[test]
fn test_io_read_partial_contract() {
    let buffer = Arc::new(FrameRingBuffer::new());
    buffer.write(&[1, 2, 3, 4, 5]);
    let mut reader = buffer.reader();

    let mut buf = [0u8; 3];
    assert_eq!(reader.read(&mut buf).unwrap(), 3);
    assert_eq!(buf, [1, 2, 3]);

    let mut buf = [0u8; 8];
    assert_eq!(reader.read(&mut buf).unwrap(), 2);
    assert_eq!(&buf[..2], &[4, 5]);
}

#[test]
fn test_concurrent_writers_keep_per_writer_order() {
    const WRITERS: u8 = 4;
    const RECORDS: u16 = 500;

    let buffer = Arc::new(FrameRingBuffer::new());
    let writers: Vec<_> = (0..WRITERS)
        .map(|id| {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                for seq in 0..RECORDS {
                    let [hi, lo] = seq.to_be_bytes();
                    buffer.write(&[id, hi, lo]);
                }
            })
        })
        .collect();

    let total = WRITERS as usize * RECORDS as usize * 3;
    let reader = {
        let buffer = Arc::clone(&buffer);
        thread::spawn(move || {
            let mut out = Vec::with_capacity(total);
            while out.len() < total {
                out.extend_from_slice(&buffer.read(97));
            }
            out
        })
    };

    for w in writers {
        w.join().unwrap();
    }
    let stream = reader.join().unwrap();
    assert_eq!(stream.len(), total);

    let mut next = [0u16; WRITERS as usize];
    for record in stream.chunks_exact(3) {
        let id = record[0] as usize;
        let seq = u16::from_be_bytes([record[1], record[2]]);
        assert_eq!(seq, next[id], "writer {id} out of order");
        next[id] += 1;
    }
    assert!(next.iter().all(|&n| n == RECORDS));
}
