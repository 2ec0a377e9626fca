//! Frame-at-a-time rectification loop.
//!
//! The loop is an explicit state machine. Each [`LoopState`] owns the values
//! produced so far for the current frame (frame buffer, corners, rectified
//! output); nothing survives into the next iteration except counters.
//!
//! ```text
//! Acquiring --frame--> Detecting --corners ok--> PatternFound --ok/degenerate--> Presenting
//!     |                    \--none / wrong count--> PatternNotFound ------------> Presenting
//!     \--end of stream--> Stopped <--stop signal-- Presenting --otherwise--> Acquiring
//! ```

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::annotate::Marker;
use crate::params::PatternSize;
use crate::rectify::{FrameError, RectifiedOutput, Rectifier};
use crate::select::{CornerSet, SelectError};
use birdseye_core::{Image, ImageView};

/// Sequential supplier of frames.
pub trait FrameSource {
    /// Prepare the source. Failure here is fatal for the loop.
    fn open(&mut self) -> Result<(), SourceError>;

    /// Next frame, `Ok(None)` at end of stream.
    ///
    /// An `Err` drops one frame; the loop keeps acquiring.
    fn next_frame(&mut self) -> Result<Option<Image>, SourceError>;
}

/// Chessboard corner detector: `Some` with row-major interior corners when
/// the pattern is visible.
pub trait CornerDetector {
    fn detect(&mut self, frame: &ImageView<'_>, pattern: PatternSize) -> Option<CornerSet>;
}

impl<F> CornerDetector for F
where
    F: FnMut(&ImageView<'_>, PatternSize) -> Option<CornerSet>,
{
    fn detect(&mut self, frame: &ImageView<'_>, pattern: PatternSize) -> Option<CornerSet> {
        self(frame, pattern)
    }
}

/// Receives every presented frame.
pub trait FrameSink {
    fn present(&mut self, presentation: &Presentation) -> Result<(), SinkError>;
}

impl<F> FrameSink for F
where
    F: FnMut(&Presentation) -> Result<(), SinkError>,
{
    fn present(&mut self, presentation: &Presentation) -> Result<(), SinkError> {
        self(presentation)
    }
}

/// Cooperative cancellation.
///
/// `should_stop` is polled before the first frame, after every presented
/// frame and after every dropped frame; it must not change state.
/// `frame_presented` is called once per presented frame, before the poll.
pub trait StopSignal {
    fn should_stop(&self) -> bool;

    fn frame_presented(&self) {}
}

impl StopSignal for AtomicBool {
    fn should_stop(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

impl<T: StopSignal + ?Sized> StopSignal for Arc<T> {
    fn should_stop(&self) -> bool {
        (**self).should_stop()
    }

    fn frame_presented(&self) {
        (**self).frame_presented()
    }
}

impl<T: StopSignal + ?Sized> StopSignal for &T {
    fn should_stop(&self) -> bool {
        (**self).should_stop()
    }

    fn frame_presented(&self) {
        (**self).frame_presented()
    }
}

/// Stops as soon as either signal does.
impl<A: StopSignal, B: StopSignal> StopSignal for (A, B) {
    fn should_stop(&self) -> bool {
        self.0.should_stop() || self.1.should_stop()
    }

    fn frame_presented(&self) {
        self.0.frame_presented();
        self.1.frame_presented();
    }
}

/// Never requests a stop; the loop ends at end of stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverStop;

impl StopSignal for NeverStop {
    fn should_stop(&self) -> bool {
        false
    }
}

/// Requests a stop once a fixed number of frames has been presented.
///
/// Dropped frames do not count. A budget of zero stops before the first
/// frame is acquired.
#[derive(Debug)]
pub struct FrameBudget {
    remaining: Cell<usize>,
}

impl FrameBudget {
    pub fn new(frames: usize) -> Self {
        Self {
            remaining: Cell::new(frames),
        }
    }
}

impl StopSignal for FrameBudget {
    fn should_stop(&self) -> bool {
        self.remaining.get() == 0
    }

    fn frame_presented(&self) {
        self.remaining.set(self.remaining.get().saturating_sub(1));
    }
}

/// Frames from any iterator; always opens.
pub struct IterSource<I> {
    frames: I,
}

impl<I: Iterator<Item = Image>> IterSource<I> {
    pub fn new(frames: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            frames: frames.into_iter(),
        }
    }
}

impl<I: Iterator<Item = Image>> FrameSource for IterSource<I> {
    fn open(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Image>, SourceError> {
        Ok(self.frames.next())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("cannot open video source: {0}")]
    Unavailable(String),
    #[error("failed to read frame {index}: {reason}")]
    Read { index: usize, reason: String },
}

#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("presentation failed: {0}")]
    Other(String),
}

#[derive(thiserror::Error, Debug)]
pub enum LoopError {
    #[error("video source unavailable")]
    SourceUnavailable(#[source] SourceError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Rectified,
    PatternNotFound,
    Degenerate,
}

/// What the loop hands to the [`FrameSink`] for one frame.
#[derive(Clone, Debug)]
pub struct Presentation {
    pub index: usize,
    /// The source frame, always present.
    pub frame: Image,
    /// The selected corners when rectification succeeded, otherwise empty.
    pub frame_markers: Vec<Marker>,
    /// Only set when `status == Rectified`.
    pub rectified: Option<RectifiedOutput>,
    pub status: FrameStatus,
    /// Why the frame was passed through.
    pub error: Option<FrameError>,
}

impl Presentation {
    fn pass_through(index: usize, frame: Image, status: FrameStatus, error: FrameError) -> Self {
        Self {
            index,
            frame,
            frame_markers: Vec::new(),
            rectified: None,
            status,
            error: Some(error),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    Requested,
}

/// One state of the per-frame state machine, carrying that stage's values.
#[derive(Debug)]
pub enum LoopState {
    Acquiring,
    Detecting {
        index: usize,
        frame: Image,
    },
    PatternFound {
        index: usize,
        frame: Image,
        corners: CornerSet,
    },
    PatternNotFound {
        index: usize,
        frame: Image,
        reason: FrameError,
    },
    Presenting(Box<Presentation>),
    Stopped(StopReason),
}

impl LoopState {
    pub fn name(&self) -> &'static str {
        match self {
            LoopState::Acquiring => "acquiring",
            LoopState::Detecting { .. } => "detecting",
            LoopState::PatternFound { .. } => "pattern_found",
            LoopState::PatternNotFound { .. } => "pattern_not_found",
            LoopState::Presenting(_) => "presenting",
            LoopState::Stopped(_) => "stopped",
        }
    }
}

/// Counters reported when the loop stops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub frames: usize,
    pub rectified: usize,
    pub not_found: usize,
    pub degenerate: usize,
    pub dropped: usize,
    pub sink_errors: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopSummary {
    pub stats: LoopStats,
    pub stop: StopReason,
}

/// Drives source, detector, rectifier and sink one frame at a time.
pub struct FrameLoop<S, D, P> {
    source: S,
    detector: D,
    sink: P,
    rectifier: Rectifier,
    stats: LoopStats,
    next_index: usize,
}

impl<S, D, P> FrameLoop<S, D, P>
where
    S: FrameSource,
    D: CornerDetector,
    P: FrameSink,
{
    pub fn new(source: S, detector: D, sink: P, rectifier: Rectifier) -> Self {
        Self {
            source,
            detector,
            sink,
            rectifier,
            stats: LoopStats::default(),
            next_index: 0,
        }
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn into_parts(self) -> (S, D, P) {
        (self.source, self.detector, self.sink)
    }

    /// Open the source and step until [`LoopState::Stopped`].
    pub fn run(&mut self, stop: &dyn StopSignal) -> Result<LoopSummary, LoopError> {
        self.source.open().map_err(|err| {
            log::error!("{err}");
            LoopError::SourceUnavailable(err)
        })?;
        log::info!(
            "frame loop started: pattern {}x{}",
            self.rectifier.params().pattern.cols,
            self.rectifier.params().pattern.rows
        );

        let mut state = if stop.should_stop() {
            LoopState::Stopped(StopReason::Requested)
        } else {
            LoopState::Acquiring
        };
        let reason = loop {
            if let LoopState::Stopped(reason) = state {
                break reason;
            }
            state = self.step(state, stop);
        };

        let s = self.stats;
        log::info!(
            "frame loop stopped ({:?}): frames={} rectified={} not_found={} degenerate={} dropped={}",
            reason,
            s.frames,
            s.rectified,
            s.not_found,
            s.degenerate,
            s.dropped
        );
        Ok(LoopSummary {
            stats: s,
            stop: reason,
        })
    }

    /// Perform exactly one transition.
    pub fn step(&mut self, state: LoopState, stop: &dyn StopSignal) -> LoopState {
        let from = state.name();
        let next = match state {
            LoopState::Acquiring => self.acquire(stop),
            LoopState::Detecting { index, frame } => self.detect(index, frame),
            LoopState::PatternFound {
                index,
                frame,
                corners,
            } => self.rectify(index, frame, &corners),
            LoopState::PatternNotFound {
                index,
                frame,
                reason,
            } => {
                log::debug!("frame {index}: {reason}, passing through");
                self.stats.not_found += 1;
                LoopState::Presenting(Box::new(Presentation::pass_through(
                    index,
                    frame,
                    FrameStatus::PatternNotFound,
                    reason,
                )))
            }
            LoopState::Presenting(presentation) => self.present(&presentation, stop),
            stopped @ LoopState::Stopped(_) => stopped,
        };
        log::trace!("{} -> {}", from, next.name());
        next
    }

    fn acquire(&mut self, stop: &dyn StopSignal) -> LoopState {
        match self.source.next_frame() {
            Ok(Some(frame)) => {
                let index = self.next_index;
                self.next_index += 1;
                self.stats.frames += 1;
                LoopState::Detecting { index, frame }
            }
            Ok(None) => LoopState::Stopped(StopReason::EndOfStream),
            Err(err) => {
                log::warn!("dropping frame: {err}");
                self.next_index += 1;
                self.stats.dropped += 1;
                if stop.should_stop() {
                    LoopState::Stopped(StopReason::Requested)
                } else {
                    LoopState::Acquiring
                }
            }
        }
    }

    fn detect(&mut self, index: usize, frame: Image) -> LoopState {
        let pattern = self.rectifier.params().pattern;
        let detected = self.detector.detect(&frame.view(), pattern);
        match detected {
            Some(corners) if corners.len() == pattern.point_count() => LoopState::PatternFound {
                index,
                frame,
                corners,
            },
            Some(corners) => LoopState::PatternNotFound {
                index,
                frame,
                reason: FrameError::Selection(SelectError::CornerCountMismatch {
                    expected: pattern.point_count(),
                    got: corners.len(),
                }),
            },
            None => LoopState::PatternNotFound {
                index,
                frame,
                reason: FrameError::PatternNotDetected,
            },
        }
    }

    fn rectify(&mut self, index: usize, frame: Image, corners: &CornerSet) -> LoopState {
        let result = self.rectifier.rectify(&frame.view(), corners);
        let presentation = match result {
            Ok(out) => {
                self.stats.rectified += 1;
                let frame_markers = out.source_markers.clone();
                Presentation {
                    index,
                    frame,
                    frame_markers,
                    rectified: Some(out),
                    status: FrameStatus::Rectified,
                    error: None,
                }
            }
            Err(err) if err.is_not_found() => {
                log::debug!("frame {index}: {err}, passing through");
                self.stats.not_found += 1;
                Presentation::pass_through(index, frame, FrameStatus::PatternNotFound, err)
            }
            Err(err) => {
                log::warn!("frame {index}: {err}, passing through");
                self.stats.degenerate += 1;
                Presentation::pass_through(index, frame, FrameStatus::Degenerate, err)
            }
        };
        LoopState::Presenting(Box::new(presentation))
    }

    fn present(&mut self, presentation: &Presentation, stop: &dyn StopSignal) -> LoopState {
        if let Err(err) = self.sink.present(presentation) {
            log::warn!("frame {}: {err}", presentation.index);
            self.stats.sink_errors += 1;
        }
        stop.frame_presented();
        if stop.should_stop() {
            LoopState::Stopped(StopReason::Requested)
        } else {
            LoopState::Acquiring
        }
    }
}
