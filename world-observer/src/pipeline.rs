//! Glue between the session tracker and the application dispatcher: the
//! "processing thread" body of the concurrency model (§5), plus the
//! replay-mode timestamp pacing used when driving the pipeline from a dump
//! file instead of a live capture.

use std::io::Read;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::warn;

use crate::dispatch::{DispatchError, Dispatcher};
use crate::session::{self, Record, SessionError, Tracker};
use crate::unet::Direction;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Drives the demux + dispatch chain over a stream of capture records,
/// owning the session tracker and the application dispatcher across
/// records. A fresh [`Dispatcher`] is installed whenever the tracker starts
/// a new session, matching session reset's "world contains no observers or
/// loot" invariant (§8 S6).
pub struct Pipeline {
    tracker: Tracker,
    dispatcher: Dispatcher,
    has_session: bool,
}

impl Pipeline {
    pub fn new(replay_mode: bool) -> Self {
        Self {
            tracker: Tracker::new(replay_mode),
            dispatcher: Dispatcher::new(),
            has_session: false,
        }
    }

    /// Feed one record through the tracker and dispatch any resulting
    /// application payloads against the active session's world.
    pub fn process_record(&mut self, record: &Record) -> Result<(), PipelineError> {
        let messages = self.tracker.accept(record)?;

        let is_new_session = self.tracker.session().is_some() && !self.has_session;
        if is_new_session {
            self.dispatcher = Dispatcher::new();
            self.has_session = true;
        }

        let Some(session) = self.tracker.session() else {
            return Ok(());
        };

        let direction = if record.outbound { Direction::Outbound } else { Direction::Inbound };
        for message in messages {
            self.dispatcher.dispatch(message.channel, &message.payload, direction, &session.world)?;
        }
        Ok(())
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }
}

/// Replay a dump file, sleeping between records so that wall-clock time
/// advances at `time_scale` relative to the recorded timestamps. A
/// `time_scale` of 0 disables pacing entirely (as fast as records can be
/// read).
pub fn replay<R: Read>(mut reader: R, src: &str, dst: &str, time_scale: f64, mut on_record: impl FnMut(&Record)) -> std::io::Result<()> {
    let mut first_timestamp: Option<i32> = None;
    let start = Instant::now();

    while let Some(record) = session::read_record(&mut reader, src, dst)? {
        if time_scale > 0.0 {
            let base = *first_timestamp.get_or_insert(record.timestamp_ms);
            let elapsed_ms = (record.timestamp_ms - base) as f64 / time_scale;
            let target = Duration::from_secs_f64((elapsed_ms / 1000.0).max(0.0));
            if let Some(remaining) = target.checked_sub(start.elapsed()) {
                std::thread::sleep(remaining);
            }
        }
        on_record(&record);
    }
    Ok(())
}

/// Convenience wrapper combining [`replay`] with a [`Pipeline`], logging
/// (rather than aborting) per-record dispatch errors so that a single
/// malformed datagram doesn't halt an entire replay.
pub fn replay_into_pipeline<R: Read>(reader: R, src: &str, dst: &str, time_scale: f64, pipeline: &mut Pipeline) -> std::io::Result<()> {
    replay(reader, src, dst, time_scale, |record| {
        if let Err(e) = pipeline.process_record(record) {
            warn!(error = %e, "dropping record after pipeline error");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::write_record;
    use std::io::Cursor;

    #[test]
    fn replay_reads_records_in_order() {
        let mut buf = Vec::new();
        write_record(&mut buf, &Record { timestamp_ms: 0, outbound: false, src: String::new(), dst: String::new(), payload: vec![1] }).unwrap();
        write_record(&mut buf, &Record { timestamp_ms: 5, outbound: true, src: String::new(), dst: String::new(), payload: vec![2] }).unwrap();

        let mut seen = Vec::new();
        replay(Cursor::new(buf), "a", "b", 0.0, |r| seen.push(r.payload.clone())).unwrap();
        assert_eq!(seen, vec![vec![1], vec![2]]);
    }

    #[test]
    fn pipeline_resets_dispatcher_on_new_session() {
        let mut pipeline = Pipeline::new(false);
        let mut payload = vec![0, 0, 1];
        payload.extend_from_slice(&[0; 10]);
        let record = Record { timestamp_ms: 0, outbound: false, src: "c".into(), dst: "10.0.0.1".into(), payload };
        pipeline.process_record(&record).unwrap();
        assert_eq!(pipeline.tracker().session().unwrap().server_addr, "10.0.0.1");
    }
}
