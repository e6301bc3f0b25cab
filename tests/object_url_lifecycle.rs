use frame_bench_wasm::domain::FramePayload;
use frame_bench_wasm::infrastructure::object_url::ObjectUrlManager;
use frame_bench_wasm::testing::RecordingBlobUrls;
use std::rc::Rc;

fn manager() -> (ObjectUrlManager, Rc<RecordingBlobUrls>) {
    let urls = Rc::new(RecordingBlobUrls::new());
    (ObjectUrlManager::new(urls.clone()), urls)
}

#[test]
fn one_live_url_per_slot() {
    let (mut manager, urls) = manager();
    let frames: Vec<FramePayload> = (0..10u8).map(|i| FramePayload::binary(vec![0xFF, 0xD8, i])).collect();

    for payload in &frames {
        manager.get_or_create(payload, "image/jpeg").unwrap();
        assert_eq!(urls.live(), 1);
    }
    assert_eq!(manager.created(), 10);
    assert_eq!(manager.revoked(), 9);

    manager.release_all();
    assert_eq!(urls.live(), 0);
    assert_eq!(urls.revoked().len(), 10);
}

#[test]
fn same_payload_reuses_its_url() {
    let (mut manager, urls) = manager();
    let payload = FramePayload::base64("/9j/4AAQ");

    let first = manager.get_or_create(&payload, "image/jpeg").unwrap();
    let again = manager.get_or_create(&payload.clone(), "image/jpeg").unwrap();
    assert_eq!(first, again);
    assert_eq!(urls.created(), vec![("blob:test/1".to_string(), "image/jpeg".to_string())]);
}

#[test]
fn bad_base64_keeps_the_current_url() {
    let (mut manager, urls) = manager();
    let good = FramePayload::binary(vec![1, 2, 3]);
    let url = manager.get_or_create(&good, "image/jpeg").unwrap();

    assert!(manager.get_or_create(&FramePayload::base64("not base64!"), "image/jpeg").is_err());
    assert_eq!(manager.live_url(), Some(url.as_str()));
    assert_eq!(urls.live(), 1);
}

#[test]
fn nothing_to_show_creates_nothing() {
    let (mut manager, urls) = manager();
    assert_eq!(manager.resolve(None, "image/jpeg").unwrap(), None);
    assert_eq!(manager.resolve(Some(&FramePayload::binary(Vec::new())), "image/jpeg").unwrap(), None);
    assert!(urls.created().is_empty());
}

#[test]
fn drop_revokes_what_is_live() {
    let (mut manager, urls) = manager();
    manager.get_or_create(&FramePayload::binary(vec![9]), "image/jpeg").unwrap();
    drop(manager);
    assert_eq!(urls.live(), 0);
}
