// coordnet/src/engine/detector.rs
//
// The sliding-window detection engine.
//
// Owns the window queue, the co-activity graph and the current window
// boundaries; advanced one input record at a time. No I/O — the caller owns
// the read loop and hands snapshot requests to the snapshot controller.
//
// Horizons: d1 bounds which events may seed a comparison as the earlier
// member of a pair ("did B replicate A's action shortly after A"); d2 is the
// full retention span, so a late event can still match against an early seed.
// The pairwise scan is quadratic in window size by design.

use thiserror::Error;
use tracing::{debug, info};

use crate::compare::Comparator;
use crate::config::DetectorConfig;
use crate::events::Interaction;
use crate::state::graph::CoactivityGraph;
use crate::state::window::WindowQueue;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("out-of-order timestamp {got} after {prev}: input must be time-ordered")]
    OutOfOrder { prev: i64, got: i64 },
}

/// Emitted when a window boundary was crossed (or at stream end). The
/// controller decides whether anything is actually written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotRequest {
    /// Start of the window just advanced from — the snapshot's filename key.
    pub window_start: i64,
    pub terminal: bool,
}

pub struct Detector {
    cfg: DetectorConfig,
    comparator: Comparator,
    queue: WindowQueue,
    graph: CoactivityGraph,
    window_start: Option<i64>,
    last_record_ts: Option<i64>,
}

impl Detector {
    pub fn new(cfg: DetectorConfig, comparator: Comparator) -> Self {
        Self {
            cfg,
            comparator,
            queue: WindowQueue::new(),
            graph: CoactivityGraph::new(),
            window_start: None,
            last_record_ts: None,
        }
    }

    /// Feed the events extracted from one input record (they all carry the
    /// record's timestamp). Returns a snapshot request when the record
    /// crossed the current window's end.
    pub fn ingest(
        &mut self,
        extractions: &[Interaction],
    ) -> Result<Option<SnapshotRequest>, DetectError> {
        let Some(first) = extractions.first() else {
            return Ok(None);
        };
        let curr_ts = first.ts;

        if let Some(prev) = self.last_record_ts {
            if curr_ts < prev {
                return Err(DetectError::OutOfOrder { prev, got: curr_ts });
            }
        }
        self.last_record_ts = Some(curr_ts);

        let request = match self.window_start {
            None => {
                info!(ts = curr_ts, "first timestamp");
                self.window_start = Some(curr_ts);
                None
            }
            Some(start) if curr_ts > start + self.cfg.d2 => {
                self.advance(start + self.cfg.d2, None);
                Some(SnapshotRequest { window_start: start, terminal: false })
            }
            Some(_) => None,
        };

        for event in extractions {
            self.queue.push(event.clone());
        }
        Ok(request)
    }

    /// Terminal pass: every remaining event is an eligible seed (the
    /// comparison horizon is stretched to the last timestamp seen). Returns
    /// None when the stream never produced an event — an empty input yields
    /// no graph and is not an error.
    pub fn finish(&mut self) -> Option<SnapshotRequest> {
        let start = self.window_start?;
        if self.queue.is_empty() {
            return None;
        }
        let (_, last_ts) = self.queue.span()?;
        info!(ts = last_ts, "last timestamp");
        self.advance(start + self.cfg.d2, Some(last_ts));
        Some(SnapshotRequest { window_start: start, terminal: true })
    }

    pub fn graph(&self) -> &CoactivityGraph {
        &self.graph
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Window advancement: trim the queue to the retention horizon, run the
    /// pairwise scan over what remains, trim again (idempotent — guards the
    /// scan's post-trim assumption), then slide the window start forward to
    /// the end of the seed horizon.
    fn advance(&mut self, end_w_ts: i64, d1_end_override: Option<i64>) {
        let start_w_ts = end_w_ts - self.cfg.d2;
        let d1_end_ts = d1_end_override.unwrap_or(start_w_ts + self.cfg.d1);

        if let Some((first, last)) = self.queue.span() {
            debug!(
                events = self.queue.len(),
                "advancing window over a {:.1} minute span",
                (last - first) as f64 / 60.0
            );
        }

        self.queue.evict_before(start_w_ts);
        if self.queue.len() >= 2 {
            self.scan(d1_end_ts);
        }
        self.queue.evict_before(start_w_ts);
        self.window_start = Some(d1_end_ts);
    }

    /// Pairwise scan: seeds range over the early sub-window only, partners
    /// over the entire retained queue.
    fn scan(&mut self, d1_end_ts: i64) {
        let Self { queue, graph, comparator, cfg, .. } = self;
        let n = queue.len();
        for i in 0..n - 1 {
            let u = &queue[i];
            if u.ts >= d1_end_ts {
                break;
            }
            for j in (i + 1)..n {
                let v = &queue[j];
                if u.actor == v.actor {
                    continue;
                }
                let strength = comparator.compare(&u.target, &v.target);
                if strength > 0.0 {
                    graph.reinforce(u, v, strength, cfg.keep_history);
                }
            }
        }
    }
}
