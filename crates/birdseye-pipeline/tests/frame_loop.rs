use approx::assert_abs_diff_eq;
use birdseye_core::{
    DirectSolve, GeometryError, HomographyFit, HomographyStrategy, Image, ImageView,
};
use birdseye_pipeline::{
    CornerSet, CorrespondenceLayout, FrameBudget, FrameError, FrameLoop, FrameSource, FrameStatus,
    IterSource, LoopError, LoopState, NeverStop, PatternSize, Presentation, Rectifier,
    RectifyParams, SinkError, SourceError, StopReason,
};
use nalgebra::Point2;
use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn checker_frame(w: usize, h: usize) -> Image {
    let mut img = Image::new(w, h, 3);
    for y in 0..h {
        for x in 0..w {
            let v = if ((x / 25) + (y / 25)) % 2 == 0 { 230 } else { 20 };
            let i = (y * w + x) * 3;
            img.data[i..i + 3].copy_from_slice(&[v, v, (x % 256) as u8]);
        }
    }
    img
}

/// Row-major 9x6 corners whose extreme corners coincide with the default
/// plane anchors, so the estimated homography is the identity.
fn identity_corners() -> CornerSet {
    let pattern = PatternSize::default();
    let mut pts = Vec::with_capacity(pattern.point_count());
    for r in 0..pattern.rows {
        for c in 0..pattern.cols {
            let x = 450.0 - 400.0 * c as f32 / (pattern.cols - 1) as f32;
            let y = 300.0 - 250.0 * r as f32 / (pattern.rows - 1) as f32;
            pts.push(Point2::new(x, y));
        }
    }
    CornerSet::new(pts)
}

fn identity_params() -> RectifyParams {
    RectifyParams {
        auxiliary: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        layout: CorrespondenceLayout::default(),
        ..RectifyParams::default()
    }
}

fn always(corners: CornerSet) -> impl FnMut(&ImageView<'_>, PatternSize) -> Option<CornerSet> {
    move |_: &ImageView<'_>, _: PatternSize| Some(corners.clone())
}

/// Counts calls and delegates to [`DirectSolve`].
struct SpyStrategy {
    calls: Rc<Cell<usize>>,
}

impl HomographyStrategy for SpyStrategy {
    fn estimate(
        &self,
        src: &[Point2<f32>],
        dst: &[Point2<f32>],
    ) -> Result<HomographyFit, GeometryError> {
        self.calls.set(self.calls.get() + 1);
        DirectSolve.estimate(src, dst)
    }
}

/// Yields scripted results, then end of stream.
struct ScriptedSource {
    open_fails: bool,
    script: Vec<Result<Image, String>>,
}

impl FrameSource for ScriptedSource {
    fn open(&mut self) -> Result<(), SourceError> {
        if self.open_fails {
            Err(SourceError::Unavailable("no camera".into()))
        } else {
            Ok(())
        }
    }

    fn next_frame(&mut self) -> Result<Option<Image>, SourceError> {
        if self.script.is_empty() {
            return Ok(None);
        }
        match self.script.remove(0) {
            Ok(frame) => Ok(Some(frame)),
            Err(reason) => Err(SourceError::Read { index: 0, reason }),
        }
    }
}

#[test]
fn identity_stream_rectifies_every_frame() {
    init_logging();
    let frames = vec![checker_frame(500, 350), checker_frame(500, 350)];
    let mut seen: Vec<Presentation> = Vec::new();

    let summary = FrameLoop::new(
        IterSource::new(frames.clone()),
        always(identity_corners()),
        |p: &Presentation| -> Result<(), SinkError> {
            seen.push(p.clone());
            Ok(())
        },
        Rectifier::new(identity_params()).expect("valid params"),
    )
    .run(&NeverStop)
    .expect("loop runs");

    assert_eq!(summary.stop, StopReason::EndOfStream);
    assert_eq!(summary.stats.frames, 2);
    assert_eq!(summary.stats.rectified, 2);
    assert_eq!(seen.len(), 2);

    let expected = [[450.0, 300.0], [50.0, 300.0], [450.0, 50.0], [50.0, 50.0]];
    for (p, frame) in seen.iter().zip(&frames) {
        assert_eq!(p.status, FrameStatus::Rectified);
        assert!(p.error.is_none());
        assert_eq!(&p.frame, frame);
        assert_eq!(p.frame_markers.len(), 4);

        let out = p.rectified.as_ref().expect("rectified output");
        assert_eq!((out.image.width, out.image.height), (500, 350));
        for (m, e) in out.markers.iter().zip(expected) {
            assert_abs_diff_eq!(m.center, Point2::new(e[0], e[1]), epsilon = 2.0);
        }
        for (x, y) in [(60, 60), (250, 175), (440, 290)] {
            assert_eq!(out.image.pixel(x, y), frame.pixel(x, y));
        }
    }
    assert_eq!(seen[0].index, 0);
    assert_eq!(seen[1].index, 1);
}

#[test]
fn missing_pattern_passes_frame_through_without_estimation() {
    init_logging();
    let calls = Rc::new(Cell::new(0));
    let frame = checker_frame(120, 80);
    let mut seen = Vec::new();

    let rectifier = Rectifier::new(identity_params())
        .expect("valid params")
        .with_strategy(SpyStrategy {
            calls: Rc::clone(&calls),
        });
    let summary = FrameLoop::new(
        IterSource::new(vec![frame.clone()]),
        |_: &ImageView<'_>, _: PatternSize| -> Option<CornerSet> { None },
        |p: &Presentation| -> Result<(), SinkError> {
            seen.push(p.clone());
            Ok(())
        },
        rectifier,
    )
    .run(&NeverStop)
    .expect("loop runs");

    assert_eq!(calls.get(), 0);
    assert_eq!(summary.stats.not_found, 1);
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].status, FrameStatus::PatternNotFound);
    assert_eq!(seen[0].error, Some(FrameError::PatternNotDetected));
    assert!(seen[0].rectified.is_none());
    assert!(seen[0].frame_markers.is_empty());
    assert_eq!(seen[0].frame, frame);
}

#[test]
fn wrong_corner_count_is_not_found() {
    let calls = Rc::new(Cell::new(0));
    let short = CornerSet::new(identity_corners().points[..20].to_vec());
    let mut statuses = Vec::new();

    let rectifier = Rectifier::new(identity_params())
        .expect("valid params")
        .with_strategy(SpyStrategy {
            calls: Rc::clone(&calls),
        });
    FrameLoop::new(
        IterSource::new(vec![checker_frame(64, 48)]),
        always(short),
        |p: &Presentation| -> Result<(), SinkError> {
            statuses.push(p.status);
            Ok(())
        },
        rectifier,
    )
    .run(&NeverStop)
    .expect("loop runs");

    assert_eq!(calls.get(), 0);
    assert_eq!(statuses, vec![FrameStatus::PatternNotFound]);
}

#[test]
fn collinear_anchor_corners_are_passed_through() {
    init_logging();
    let mut corners = identity_corners();
    // Corner 45 onto the line through corners 0 and 8.
    corners.points[45] = Point2::new(250.0, 300.0);
    let frame = checker_frame(500, 350);
    let mut seen = Vec::new();

    let summary = FrameLoop::new(
        IterSource::new(vec![frame.clone()]),
        always(corners),
        |p: &Presentation| -> Result<(), SinkError> {
            seen.push(p.clone());
            Ok(())
        },
        Rectifier::new(identity_params()).expect("valid params"),
    )
    .run(&NeverStop)
    .expect("loop runs");

    assert_eq!(summary.stats.degenerate, 1);
    assert_eq!(summary.stats.rectified, 0);
    let p = &seen[0];
    assert_eq!(p.status, FrameStatus::Degenerate);
    assert!(matches!(
        p.error,
        Some(FrameError::DegenerateGeometry(GeometryError::Collinear { .. }))
    ));
    assert!(p.rectified.is_none());
    assert!(p.frame_markers.is_empty());
    assert_eq!(p.frame, frame);
}

#[test]
fn unavailable_source_is_fatal() {
    let mut presented = 0;
    let err = FrameLoop::new(
        ScriptedSource {
            open_fails: true,
            script: vec![Ok(checker_frame(10, 10))],
        },
        always(identity_corners()),
        |_: &Presentation| -> Result<(), SinkError> {
            presented += 1;
            Ok(())
        },
        Rectifier::new(identity_params()).expect("valid params"),
    )
    .run(&NeverStop)
    .unwrap_err();

    assert!(matches!(
        err,
        LoopError::SourceUnavailable(SourceError::Unavailable(_))
    ));
    assert_eq!(presented, 0);
}

#[test]
fn unreadable_frame_is_dropped_and_loop_continues() {
    init_logging();
    let mut indices = Vec::new();
    let summary = FrameLoop::new(
        ScriptedSource {
            open_fails: false,
            script: vec![
                Ok(checker_frame(32, 32)),
                Err("truncated".into()),
                Ok(checker_frame(32, 32)),
            ],
        },
        |_: &ImageView<'_>, _: PatternSize| -> Option<CornerSet> { None },
        |p: &Presentation| -> Result<(), SinkError> {
            indices.push(p.index);
            Ok(())
        },
        Rectifier::new(identity_params()).expect("valid params"),
    )
    .run(&NeverStop)
    .expect("loop runs");

    assert_eq!(summary.stats.dropped, 1);
    assert_eq!(summary.stats.frames, 2);
    assert_eq!(summary.stop, StopReason::EndOfStream);
    assert_eq!(indices, vec![0, 2]);
}

#[test]
fn stop_signal_ends_loop_after_presentation() {
    let mut presented = 0;
    let budget = FrameBudget::new(2);
    let summary = FrameLoop::new(
        IterSource::new(vec![checker_frame(16, 16); 5]),
        |_: &ImageView<'_>, _: PatternSize| -> Option<CornerSet> { None },
        |_: &Presentation| -> Result<(), SinkError> {
            presented += 1;
            Ok(())
        },
        Rectifier::new(identity_params()).expect("valid params"),
    )
    .run(&budget)
    .expect("loop runs");

    assert_eq!(summary.stop, StopReason::Requested);
    assert_eq!(summary.stats.frames, 2);
    assert_eq!(presented, 2);
}

#[test]
fn sink_failures_are_counted_not_fatal() {
    let summary = FrameLoop::new(
        IterSource::new(vec![checker_frame(16, 16); 3]),
        |_: &ImageView<'_>, _: PatternSize| -> Option<CornerSet> { None },
        |_: &Presentation| -> Result<(), SinkError> { Err(SinkError::Other("window closed".into())) },
        Rectifier::new(identity_params()).expect("valid params"),
    )
    .run(&NeverStop)
    .expect("loop runs");

    assert_eq!(summary.stats.sink_errors, 3);
    assert_eq!(summary.stop, StopReason::EndOfStream);
}

#[test]
fn manual_stepping_visits_each_state() {
    let mut lp = FrameLoop::new(
        IterSource::new(vec![checker_frame(500, 350)]),
        always(identity_corners()),
        |_: &Presentation| -> Result<(), SinkError> { Ok(()) },
        Rectifier::new(identity_params()).expect("valid params"),
    );

    let mut state = LoopState::Acquiring;
    let mut names = vec![state.name()];
    while !matches!(state, LoopState::Stopped(_)) {
        state = lp.step(state, &NeverStop);
        names.push(state.name());
    }
    assert_eq!(
        names,
        vec![
            "acquiring",
            "detecting",
            "pattern_found",
            "presenting",
            "acquiring",
            "stopped"
        ]
    );
    assert_eq!(lp.stats().rectified, 1);
}

#[test]
fn zero_budget_presents_nothing() {
    let mut presented = 0;
    let summary = FrameLoop::new(
        IterSource::new(vec![checker_frame(16, 16); 3]),
        |_: &ImageView<'_>, _: PatternSize| -> Option<CornerSet> { None },
        |_: &Presentation| -> Result<(), SinkError> {
            presented += 1;
            Ok(())
        },
        Rectifier::new(identity_params()).expect("valid params"),
    )
    .run(&FrameBudget::new(0))
    .expect("loop runs");

    assert_eq!(presented, 0);
    assert_eq!(summary.stats.frames, 0);
    assert_eq!(summary.stop, StopReason::Requested);
}

#[test]
fn dropped_frames_do_not_consume_budget() {
    let mut indices = Vec::new();
    let summary = FrameLoop::new(
        ScriptedSource {
            open_fails: false,
            script: vec![
                Err("truncated".into()),
                Ok(checker_frame(16, 16)),
                Err("truncated".into()),
                Ok(checker_frame(16, 16)),
                Ok(checker_frame(16, 16)),
            ],
        },
        |_: &ImageView<'_>, _: PatternSize| -> Option<CornerSet> { None },
        |p: &Presentation| -> Result<(), SinkError> {
            indices.push(p.index);
            Ok(())
        },
        Rectifier::new(identity_params()).expect("valid params"),
    )
    .run(&FrameBudget::new(2))
    .expect("loop runs");

    assert_eq!(indices, vec![1, 3]);
    assert_eq!(summary.stats.dropped, 2);
    assert_eq!(summary.stop, StopReason::Requested);
}

#[test]
fn interrupt_flag_stops_after_current_frame() {
    let flag = AtomicBool::new(false);
    let mut presented = 0;
    let summary = FrameLoop::new(
        IterSource::new(vec![checker_frame(16, 16); 4]),
        |_: &ImageView<'_>, _: PatternSize| -> Option<CornerSet> { None },
        |_: &Presentation| -> Result<(), SinkError> {
            presented += 1;
            // Interrupt arrives while the first frame is being shown.
            flag.store(true, Ordering::Relaxed);
            Ok(())
        },
        Rectifier::new(identity_params()).expect("valid params"),
    )
    .run(&(&flag, FrameBudget::new(10)))
    .expect("loop runs");

    assert_eq!(presented, 1);
    assert_eq!(summary.stats.frames, 1);
    assert_eq!(summary.stop, StopReason::Requested);
}
