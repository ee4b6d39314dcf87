//! Async batch surface over the synchronous decode and parse paths.
//!
//! Decoding and PDU parsing are CPU-bound with no I/O, so the async
//! layer is a scheduling convenience only: work is offloaded to tokio's
//! blocking pool in chunks, and outputs come back in input order. There
//! is no internal timeout or cancellation; dropping the future is the
//! only cancellation a caller needs.

use std::sync::Arc;

use futures::future::join_all;
use tracing::debug;

use blesig_core::{CharacteristicData, CodecRegistry, Uuid16};

use crate::error::Result;
use crate::pdu::AdvertisingPdu;

/// Inputs per blocking-pool task. Small enough that one slow chunk does
/// not serialize the batch, large enough to amortize the spawn cost.
const CHUNK_SIZE: usize = 64;

/// One characteristic read to decode: 16-bit SIG UUID plus raw value bytes.
pub type CharacteristicRead = (Uuid16, Vec<u8>);

/// Decode a batch of characteristic reads on the blocking pool.
///
/// Output order matches input order. `None` entries are UUIDs with no
/// registered codec; per-characteristic parse failures come back as
/// `parse_success == false` results, never as task failures.
pub async fn decode_batch(
    registry: Arc<CodecRegistry>,
    reads: Vec<CharacteristicRead>,
) -> Vec<Option<CharacteristicData>> {
    let total = reads.len();
    debug!(total, "dispatching characteristic decode batch");

    let tasks: Vec<_> = reads
        .chunks(CHUNK_SIZE)
        .map(|chunk| {
            let registry = Arc::clone(&registry);
            let chunk: Vec<CharacteristicRead> = chunk.to_vec();
            tokio::task::spawn_blocking(move || {
                chunk
                    .iter()
                    .map(|(uuid, raw)| registry.decode(*uuid, raw))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut out = Vec::with_capacity(total);
    for joined in join_all(tasks).await {
        // spawn_blocking only fails on panic or runtime shutdown; decode
        // itself never panics, so propagating the panic is correct.
        out.extend(joined.expect("decode task panicked"));
    }
    out
}

/// Parse a batch of raw advertising PDUs on the blocking pool.
///
/// Output order matches input order; each entry carries its own parse
/// result so one malformed PDU never poisons the batch.
pub async fn parse_pdu_batch(pdus: Vec<Vec<u8>>) -> Vec<Result<AdvertisingPdu>> {
    let total = pdus.len();
    debug!(total, "dispatching PDU parse batch");

    let tasks: Vec<_> = pdus
        .chunks(CHUNK_SIZE)
        .map(|chunk| {
            let chunk: Vec<Vec<u8>> = chunk.to_vec();
            tokio::task::spawn_blocking(move || {
                chunk
                    .iter()
                    .map(|raw| AdvertisingPdu::parse(raw))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut out = Vec::with_capacity(total);
    for joined in join_all(tasks).await {
        out.extend(joined.expect("parse task panicked"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const BATTERY: Uuid16 = Uuid16(0x2A19);

    #[tokio::test]
    async fn test_decode_batch_preserves_order() {
        let registry = Arc::new(CodecRegistry::with_builtin());
        let unknown = Uuid16(0xFFFE);

        let reads = vec![
            (BATTERY, vec![0x64]),
            (unknown, vec![0x00]),
            (BATTERY, vec![0x2A]),
        ];

        let results = decode_batch(registry, reads).await;
        assert_eq!(results.len(), 3);
        assert_eq!(
            results[0].as_ref().unwrap().value.as_ref().unwrap().as_f64(),
            Some(100.0)
        );
        assert!(results[1].is_none());
        assert_eq!(
            results[2].as_ref().unwrap().value.as_ref().unwrap().as_f64(),
            Some(42.0)
        );
    }

    #[tokio::test]
    async fn test_decode_batch_survives_bad_entry() {
        let registry = Arc::new(CodecRegistry::with_builtin());

        let reads = vec![
            (BATTERY, vec![]), // too short
            (BATTERY, vec![0x50]),
        ];

        let results = decode_batch(registry, reads).await;
        let failed = results[0].as_ref().unwrap();
        assert!(!failed.parse_success);
        assert!(results[1].as_ref().unwrap().parse_success);
    }

    #[tokio::test]
    async fn test_decode_batch_larger_than_chunk() {
        let registry = Arc::new(CodecRegistry::with_builtin());
        let reads: Vec<_> = (0..=100u8)
            .map(|level| (BATTERY, vec![level]))
            .collect();

        let results = decode_batch(registry, reads).await;
        assert_eq!(results.len(), 101);
        for (level, result) in results.iter().enumerate() {
            let data = result.as_ref().unwrap();
            assert_eq!(data.value.as_ref().unwrap().as_f64(), Some(level as f64));
        }
    }

    #[tokio::test]
    async fn test_pdu_batch_mixed_results() {
        // ADV_IND with AdvA + one flags structure, then a truncated PDU.
        let good = vec![
            0x00, 0x09, // header: type 0, length 9
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, // AdvA
            0x02, 0x01, 0x06, // flags structure
        ];
        let bad = vec![0x00];

        let results = parse_pdu_batch(vec![good, bad]).await;
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }
}
