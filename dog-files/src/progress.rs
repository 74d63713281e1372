//! Progress sampling for running transfers.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::stream::PositionProbe;

/// One observation of a running transfer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressSample {
    /// Share of the total length moved so far, in `[0, 100]`
    pub percent: f64,
    pub bytes_transferred: u64,
}

impl ProgressSample {
    /// Build a sample; an empty transfer is always complete
    pub fn new(bytes_transferred: u64, total_length: u64) -> Self {
        let percent = if total_length == 0 {
            100.0
        } else {
            (bytes_transferred as f64 * 100.0 / total_length as f64).clamp(0.0, 100.0)
        };
        Self {
            percent,
            bytes_transferred,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.percent >= 100.0
    }
}

/// Periodically observes a [`PositionProbe`] and reports progress.
///
/// The sampler never touches the stream itself. It stops when the position
/// reaches the total length, when `finished` fires (after one last
/// observation), or silently when `cancel` fires.
#[derive(Debug)]
pub struct ProgressSampler {
    probe: PositionProbe,
    total_length: u64,
    interval: Duration,
}

impl ProgressSampler {
    pub fn new(probe: PositionProbe, total_length: u64, interval: Duration) -> Self {
        Self {
            probe,
            total_length,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub async fn run<F>(self, cancel: CancellationToken, finished: CancellationToken, mut emit: F)
    where
        F: FnMut(ProgressSample),
    {
        if self.total_length == 0 {
            if !cancel.is_cancelled() {
                emit(ProgressSample::new(0, 0));
            }
            return;
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = finished.cancelled() => {
                    self.observe(&mut last, &mut emit);
                    return;
                }
                _ = ticker.tick() => {
                    if self.observe(&mut last, &mut emit) {
                        return;
                    }
                }
            }
        }
    }

    /// Emit a sample if the position moved; returns true once the total is reached
    fn observe<F: FnMut(ProgressSample)>(&self, last: &mut u64, emit: &mut F) -> bool {
        let position = self.probe.position().min(self.total_length);
        if position > *last {
            *last = position;
            emit(ProgressSample::new(position, self.total_length));
        }
        position >= self.total_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Tracked;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn percent_is_proportional_and_clamped() {
        assert_eq!(ProgressSample::new(0, 200).percent, 0.0);
        assert_eq!(ProgressSample::new(50, 200).percent, 25.0);
        assert_eq!(ProgressSample::new(300, 200).percent, 100.0);
    }

    #[test]
    fn empty_transfer_is_complete() {
        let sample = ProgressSample::new(0, 0);
        assert_eq!(sample.percent, 100.0);
        assert!(sample.is_complete());
    }

    #[tokio::test]
    async fn zero_length_emits_single_complete_sample() {
        let sampler = ProgressSampler::new(PositionProbe::new(), 0, Duration::from_millis(5));
        let mut samples = Vec::new();
        sampler
            .run(CancellationToken::new(), CancellationToken::new(), |s| samples.push(s))
            .await;
        assert_eq!(samples, vec![ProgressSample::new(0, 0)]);
    }

    #[tokio::test]
    async fn samples_are_monotonic_and_end_at_total() {
        let mut writer = Tracked::new(Vec::new());
        let sampler = ProgressSampler::new(writer.probe(), 4096, Duration::from_millis(1));
        let cancel = CancellationToken::new();
        let finished = CancellationToken::new();

        let mut samples = Vec::new();
        let transfer = async {
            for _ in 0..16 {
                writer.write_all(&[1u8; 256]).await.unwrap();
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            finished.cancel();
        };

        tokio::join!(
            sampler.run(cancel.clone(), finished.clone(), |s| samples.push(s)),
            transfer
        );

        assert!(!samples.is_empty());
        assert!(samples
            .windows(2)
            .all(|w| w[0].bytes_transferred < w[1].bytes_transferred));
        let last = samples.last().unwrap();
        assert_eq!(last.bytes_transferred, 4096);
        assert_eq!(last.percent, 100.0);
    }

    #[tokio::test]
    async fn cancellation_stops_without_emitting() {
        let probe = PositionProbe::new();
        let sampler = ProgressSampler::new(probe, 100, Duration::from_millis(1));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut samples = Vec::new();
        sampler
            .run(cancel, CancellationToken::new(), |s| samples.push(s))
            .await;
        assert!(samples.is_empty());
    }
}
