use image::{Rgba, RgbaImage};
use qa_annotate::io::{ContainerSize, ImageSource, RemoteFetcher, CredentialsMode, encode_png};
use qa_annotate::{AnnotateError, AnnotationSession, SessionOptions, Tool};

fn gradient(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, y| Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255]))
}

fn session_with(image: RgbaImage, dpr: f32) -> AnnotationSession {
    let mut session = AnnotationSession::new(SessionOptions { device_pixel_ratio: dpr, ..Default::default() });
    session.load_decoded(image, None).unwrap();
    session
}

fn snapshot(session: &AnnotationSession) -> Vec<u8> {
    session.pixels().map(|p| p.as_raw().clone()).unwrap_or_default()
}

fn draw(session: &mut AnnotationSession, tool: Tool, from: (f32, f32), to: (f32, f32)) {
    session.set_tool(tool);
    session.begin_stroke(from.0, from.1);
    session.extend_stroke(to.0, to.1);
    assert!(session.end_stroke().unwrap());
}

#[test]
fn undo_then_redo_is_identity() {
    let mut session = session_with(gradient(64, 48), 1.0);
    draw(&mut session, Tool::Brush, (4.0, 4.0), (60.0, 40.0));
    draw(&mut session, Tool::Rectangle, (10.0, 10.0), (30.0, 30.0));
    let after = snapshot(&session);

    assert!(session.undo());
    assert_ne!(snapshot(&session), after);
    assert!(session.redo());
    assert_eq!(snapshot(&session), after);
}

#[test]
fn undo_restores_each_checkpoint_byte_for_byte() {
    let mut session = session_with(gradient(64, 48), 2.0);
    let base = snapshot(&session);
    draw(&mut session, Tool::Circle, (8.0, 8.0), (40.0, 30.0));
    let one = snapshot(&session);
    draw(&mut session, Tool::Arrow, (5.0, 40.0), (60.0, 10.0));

    assert!(session.undo());
    assert_eq!(snapshot(&session), one);
    assert!(session.undo());
    assert_eq!(snapshot(&session), base);
    assert!(!session.undo());
    assert_eq!(snapshot(&session), base);
}

#[test]
fn new_checkpoint_invalidates_redo() {
    let mut session = session_with(gradient(32, 32), 1.0);
    draw(&mut session, Tool::Brush, (2.0, 2.0), (30.0, 2.0));
    assert!(session.undo());
    assert!(session.can_redo());

    draw(&mut session, Tool::Brush, (2.0, 20.0), (30.0, 20.0));
    assert!(!session.can_redo());
    let current = snapshot(&session);
    assert!(!session.redo());
    assert_eq!(snapshot(&session), current);
}

#[test]
fn physical_size_follows_device_pixel_ratio() {
    for dpr in [1.0, 1.5, 2.0, 3.0] {
        let session = session_with(gradient(300, 200), dpr);
        let dims = session.dimensions().unwrap();
        assert_eq!(dims.physical_width, (dims.logical_width as f32 * dpr).round() as u32);
        assert_eq!(dims.physical_height, (dims.logical_height as f32 * dpr).round() as u32);
        let pixels = session.pixels().unwrap();
        assert_eq!(pixels.dimensions(), (dims.physical_width, dims.physical_height));
    }
}

#[test]
fn images_are_never_scaled_up() {
    let png = encode_png(&gradient(300, 200)).unwrap().bytes;
    let mut session = AnnotationSession::default();
    session
        .load(&ImageSource::Bytes(png), Some(ContainerSize::new(2000, 2000)))
        .unwrap();
    let dims = session.dimensions().unwrap();
    assert_eq!((dims.logical_width, dims.logical_height), (300, 200));
}

#[test]
fn clear_restores_the_original_and_adds_one_entry() {
    let mut session = session_with(gradient(40, 40), 1.0);
    let base = snapshot(&session);
    draw(&mut session, Tool::Brush, (0.0, 0.0), (40.0, 40.0));
    draw(&mut session, Tool::Rectangle, (5.0, 5.0), (35.0, 35.0));
    let entries = session.history().len();

    session.clear();
    assert_eq!(snapshot(&session), base);
    assert_eq!(session.history().len(), entries + 1);

    assert!(session.undo());
    assert_ne!(snapshot(&session), base);
}

#[test]
fn export_is_deterministic() {
    let mut session = session_with(gradient(50, 30), 2.0);
    draw(&mut session, Tool::Arrow, (2.0, 2.0), (45.0, 25.0));
    let a = session.export_image().unwrap();
    let b = session.export_image().unwrap();
    assert_eq!(a, b);
    assert_eq!(a.mime, "image/png");
    assert_eq!((a.width, a.height), (100, 60));

    let decoded = image::load_from_memory(&a.bytes).unwrap().to_rgba8();
    assert_eq!(decoded.as_raw(), &snapshot(&session));
}

#[test]
fn large_screenshot_fits_its_container() {
    let png = encode_png(&gradient(2000, 1000)).unwrap().bytes;
    let mut session = AnnotationSession::default();
    session
        .load(&ImageSource::Bytes(png), Some(ContainerSize::new(800, 600)))
        .unwrap();
    let dims = session.dimensions().unwrap();
    assert_eq!((dims.logical_width, dims.logical_height), (800, 400));
    assert_eq!((dims.physical_width, dims.physical_height), (800, 400));
    assert_eq!(session.history().len(), 1);
    assert!(!session.can_undo());
    assert!(!session.can_redo());

    let base = snapshot(&session);
    draw(&mut session, Tool::Brush, (100.0, 100.0), (300.0, 200.0));
    let marked = snapshot(&session);
    assert!(session.can_undo() && !session.can_redo());

    assert!(session.undo());
    assert!(!session.can_undo() && session.can_redo());
    assert_eq!(snapshot(&session), base);

    assert!(session.redo());
    assert!(session.can_undo() && !session.can_redo());
    assert_eq!(snapshot(&session), marked);

    let blob = session.export_image().unwrap();
    assert!(!blob.bytes.is_empty());
    assert_eq!((blob.width, blob.height), (800, 400));
}

struct FailingFetcher;

impl RemoteFetcher for FailingFetcher {
    fn fetch(&self, url: &str, _mode: CredentialsMode) -> qa_annotate::Result<Vec<u8>> {
        Err(AnnotateError::Fetch(format!("{} unreachable", url)))
    }
}

#[test]
fn fetch_failure_leaves_no_surface() {
    let mut session = AnnotationSession::default().with_fetcher(Box::new(FailingFetcher));
    let err = session
        .load(&ImageSource::Url("https://storage.example/evidence.png".into()), None)
        .unwrap_err();
    assert!(matches!(err, AnnotateError::Fetch(_)));
    assert!(!session.is_loaded());
    assert!(matches!(session.export_image(), Err(AnnotateError::NotInitialized)));
}

#[test]
fn reload_discards_previous_history() {
    let mut session = session_with(gradient(20, 20), 1.0);
    draw(&mut session, Tool::Brush, (0.0, 0.0), (20.0, 20.0));
    session.load_decoded(gradient(10, 10), None).unwrap();
    assert_eq!(session.history().len(), 1);
    assert!(!session.can_undo());
    assert_eq!(session.dimensions().map(|d| d.logical_width), Some(10));
}
