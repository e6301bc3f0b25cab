//! Blob URL lifecycle for `<img>` based strategies.

use std::rc::Rc;

use js_sys::{Array, Uint8Array};
use web_sys::{Blob, BlobPropertyBag, Url};

use crate::domain::{
    errors::{BenchError, BenchResult},
    frame::{FramePayload, PayloadKey},
    logging::{LogComponent, get_logger},
};

/// Creates and revokes dereferenceable URLs for in-memory bytes.
pub trait BlobUrlFactory {
    fn create(&self, bytes: &[u8], mime_type: &str) -> BenchResult<String>;
    fn revoke(&self, url: &str);
}

impl<F: BlobUrlFactory + ?Sized> BlobUrlFactory for Rc<F> {
    fn create(&self, bytes: &[u8], mime_type: &str) -> BenchResult<String> {
        (**self).create(bytes, mime_type)
    }

    fn revoke(&self, url: &str) {
        (**self).revoke(url)
    }
}

/// Wrap bytes in a typed `Blob`. Shared with the worker runtime.
pub fn bytes_to_blob(bytes: &[u8], mime_type: &str) -> BenchResult<Blob> {
    let parts = Array::of1(&Uint8Array::from(bytes));
    let options = BlobPropertyBag::new();
    options.set_type(mime_type);
    Blob::new_with_u8_array_sequence_and_options(&parts, &options)
        .map_err(|e| BenchError::Decode(format!("Failed to create Blob: {e:?}")))
}

/// `URL.createObjectURL` / `URL.revokeObjectURL`
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserBlobUrls;

impl BlobUrlFactory for BrowserBlobUrls {
    fn create(&self, bytes: &[u8], mime_type: &str) -> BenchResult<String> {
        let blob = bytes_to_blob(bytes, mime_type)?;
        Url::create_object_url_with_blob(&blob)
            .map_err(|e| BenchError::Decode(format!("Failed to create object URL: {e:?}")))
    }

    fn revoke(&self, url: &str) {
        if let Err(e) = Url::revoke_object_url(url) {
            get_logger().warn(
                LogComponent::Infrastructure("ObjectUrl"),
                &format!("Failed to revoke {url}: {e:?}"),
            );
        }
    }
}

struct LiveUrl {
    key: PayloadKey,
    url: String,
}

/// Owner of the object URL of one logical image slot.
///
/// At most one URL is live at a time. Resolving a new payload hands out a
/// fresh URL and revokes the previous one in the same call; resolving the
/// payload already held returns the cached URL. Everything still live is
/// revoked on `release_all` and on drop.
pub struct ObjectUrlManager {
    factory: Rc<dyn BlobUrlFactory>,
    live: Option<LiveUrl>,
    created: u64,
    revoked: u64,
}

impl ObjectUrlManager {
    pub fn new(factory: Rc<dyn BlobUrlFactory>) -> Self {
        Self { factory, live: None, created: 0, revoked: 0 }
    }

    pub fn browser() -> Self {
        Self::new(Rc::new(BrowserBlobUrls))
    }

    /// URL for `payload`, or `None` when there is nothing to show.
    ///
    /// A payload that fails to decode leaves the current URL in place.
    pub fn resolve(&mut self, payload: Option<&FramePayload>, mime_type: &str) -> BenchResult<Option<String>> {
        match payload {
            Some(payload) if !payload.is_empty() => self.get_or_create(payload, mime_type).map(Some),
            _ => Ok(None),
        }
    }

    pub fn get_or_create(&mut self, payload: &FramePayload, mime_type: &str) -> BenchResult<String> {
        let key = payload.key();
        if let Some(live) = &self.live {
            if live.key == key {
                return Ok(live.url.clone());
            }
        }

        let bytes = payload.to_bytes()?;
        let url = self.factory.create(&bytes, mime_type)?;
        self.created += 1;

        let previous = self.live.replace(LiveUrl { key, url: url.clone() });
        if let Some(previous) = previous {
            self.revoke(previous);
        }
        Ok(url)
    }

    /// Revoke the live URL, if any.
    pub fn invalidate(&mut self) {
        if let Some(live) = self.live.take() {
            self.revoke(live);
        }
    }

    pub fn release_all(&mut self) {
        self.invalidate();
    }

    pub fn live_url(&self) -> Option<&str> {
        self.live.as_ref().map(|l| l.url.as_str())
    }

    pub fn created(&self) -> u64 {
        self.created
    }

    pub fn revoked(&self) -> u64 {
        self.revoked
    }

    fn revoke(&mut self, live: LiveUrl) {
        self.factory.revoke(&live.url);
        self.revoked += 1;
    }
}

impl Drop for ObjectUrlManager {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingBlobUrls;

    const MIME: &str = "image/jpeg";

    fn manager() -> (ObjectUrlManager, Rc<RecordingBlobUrls>) {
        let urls = Rc::new(RecordingBlobUrls::default());
        (ObjectUrlManager::new(urls.clone()), urls)
    }

    #[test]
    fn same_payload_reuses_url() {
        let (mut manager, urls) = manager();
        let payload = FramePayload::base64("/9j/4A==");
        let first = manager.resolve(Some(&payload), MIME).unwrap();
        let second = manager.resolve(Some(&payload), MIME).unwrap();
        assert_eq!(first, second);
        assert_eq!(urls.created().len(), 1);
        assert_eq!(urls.created()[0].1, MIME);
    }

    #[test]
    fn replacement_revokes_previous_once() {
        let (mut manager, urls) = manager();
        let p1 = FramePayload::binary(vec![0xFF, 0xD8, 1]);
        let p2 = FramePayload::binary(vec![0xFF, 0xD8, 2]);
        let u1 = manager.resolve(Some(&p1), MIME).unwrap().unwrap();
        let u2 = manager.resolve(Some(&p2), MIME).unwrap().unwrap();
        assert_ne!(u1, u2);
        assert_eq!(urls.revoked(), vec![u1]);
        assert_eq!(manager.live_url(), Some(u2.as_str()));
    }

    #[test]
    fn missing_or_empty_payload_yields_none() {
        let (mut manager, urls) = manager();
        assert_eq!(manager.resolve(None, MIME).unwrap(), None);
        assert_eq!(manager.resolve(Some(&FramePayload::base64("")), MIME).unwrap(), None);
        assert!(urls.created().is_empty());
    }

    #[test]
    fn bad_base64_keeps_current_url() {
        let (mut manager, urls) = manager();
        let good = manager.resolve(Some(&FramePayload::base64("/9j/4A==")), MIME).unwrap();
        let err = manager.resolve(Some(&FramePayload::base64("***")), MIME).unwrap_err();
        assert!(matches!(err, BenchError::Decode(_)));
        assert_eq!(manager.live_url().map(str::to_string), good);
        assert!(urls.revoked().is_empty());
    }

    #[test]
    fn drop_revokes_outstanding_url() {
        let (mut manager, urls) = manager();
        manager.resolve(Some(&FramePayload::binary(vec![1])), MIME).unwrap();
        drop(manager);
        assert_eq!(urls.revoked().len(), 1);
        assert_eq!(urls.live(), 0);
    }
}
