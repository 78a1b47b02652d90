//! Owns a spectrum source and the engine it feeds.

use std::time::Duration;

use crate::engine::{Engine, FeatureReader, FeatureVector};
use crate::source::{SourceError, SpectrumSource};

pub struct Session<S: SpectrumSource> {
    source: S,
    engine: Engine,
    frame: Vec<f32>,
    source_open: bool,
}

impl<S: SpectrumSource> Session<S> {
    pub fn new(source: S, engine: Engine) -> Self {
        Self {
            source,
            engine,
            frame: Vec::new(),
            source_open: false,
        }
    }

    /// Acquire the source and start the engine. On failure nothing starts and the
    /// error is returned once; the caller may retry.
    pub fn start(&mut self) -> Result<(), SourceError> {
        if self.engine.is_streaming() {
            return Ok(());
        }
        if let Err(err) = self.source.open() {
            log::error!("Could not start audio stream: {}", err);
            return Err(err);
        }
        self.source_open = true;
        self.frame.clear();
        self.engine.start();
        Ok(())
    }

    /// Stop ticking and release the source. Safe to call at any time, repeatedly.
    pub fn stop(&mut self) {
        self.engine.stop();
        if self.source_open {
            self.source.close();
            self.source_open = false;
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.engine.is_streaming()
    }

    /// Pull one frame and tick the engine on wall-clock time. Returns `false` when not
    /// streaming or the source ran dry.
    pub fn step(&mut self) -> bool {
        if !self.pull() {
            return false;
        }
        self.engine.on_tick(&self.frame)
    }

    /// Like [`Session::step`] with an explicit stream time.
    pub fn step_at(&mut self, at: Duration) -> bool {
        if !self.pull() {
            return false;
        }
        self.engine.tick_at(&self.frame, at)
    }

    fn pull(&mut self) -> bool {
        self.engine.is_streaming() && self.source.next_frame(&mut self.frame)
    }

    pub fn features(&self) -> FeatureVector {
        self.engine.features()
    }

    pub fn reader(&self) -> FeatureReader {
        self.engine.reader()
    }

    /// Frame consumed by the most recent step.
    pub fn last_frame(&self) -> &[f32] {
        &self.frame
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: SpectrumSource> Drop for Session<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Scripted {
        frames: Vec<Vec<f32>>,
        cursor: usize,
        fail_open: bool,
        closes: Rc<Cell<usize>>,
    }

    impl Scripted {
        fn new(frames: Vec<Vec<f32>>) -> Self {
            Self {
                frames,
                cursor: 0,
                fail_open: false,
                closes: Rc::new(Cell::new(0)),
            }
        }
    }

    impl SpectrumSource for Scripted {
        fn open(&mut self) -> Result<(), SourceError> {
            if self.fail_open {
                return Err(SourceError::Unavailable("permission denied".into()));
            }
            self.cursor = 0;
            Ok(())
        }

        fn next_frame(&mut self, frame: &mut Vec<f32>) -> bool {
            let Some(next) = self.frames.get(self.cursor) else {
                return false;
            };
            frame.clear();
            frame.extend_from_slice(next);
            self.cursor += 1;
            true
        }

        fn close(&mut self) {
            self.closes.set(self.closes.get() + 1);
        }

        fn bins(&self) -> usize {
            1024
        }
    }

    #[test]
    fn failed_open_leaves_engine_idle() {
        let mut source = Scripted::new(vec![vec![255.0; 1024]]);
        source.fail_open = true;
        let closes = Rc::clone(&source.closes);
        let mut session = Session::new(source, Engine::default());

        assert!(matches!(session.start(), Err(SourceError::Unavailable(_))));
        assert!(!session.is_streaming());
        assert!(!session.step_at(Duration::ZERO));
        assert_eq!(session.features(), FeatureVector::default());

        session.stop();
        assert_eq!(closes.get(), 0);
    }

    #[test]
    fn steps_until_source_runs_dry() {
        let frames = vec![vec![100.0; 1024]; 3];
        let mut session = Session::new(Scripted::new(frames), Engine::default());
        session.start().unwrap();

        let mut ticks = 0;
        while session.step_at(Duration::from_millis(ticks * 16)) {
            ticks += 1;
        }
        assert_eq!(ticks, 3);
        assert_eq!(session.last_frame().len(), 1024);
        assert!(session.features().level > 0.0);
    }

    #[test]
    fn stop_releases_source_once() {
        let source = Scripted::new(vec![vec![0.0; 1024]; 4]);
        let closes = Rc::clone(&source.closes);
        let mut session = Session::new(source, Engine::default());
        session.start().unwrap();
        session.start().unwrap();
        assert!(session.step_at(Duration::ZERO));

        session.stop();
        session.stop();
        assert_eq!(closes.get(), 1);
        assert!(!session.step_at(Duration::from_millis(16)));

        drop(session);
        assert_eq!(closes.get(), 1);
    }
}
