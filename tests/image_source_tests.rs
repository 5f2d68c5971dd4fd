//! Image Source Tests
//!
//! Tests for:
//! - Construction: the three factories, absent inputs, weak self references
//! - makeTextureSource: cache hits, synchronous instantiation, failure
//! - lockTextureProxy: proxy reuse, key registration, DISABLE_CACHE, texture backed sources
//! - makeDecoded / makeMipMapped: promotion, identity fallbacks

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use texsource::{
    Context, ContextOptions, Error, HeadlessDevice, ImageBuffer, ImageGenerator, ImageSource,
    Rgba, SurfaceFlags, Texture, UniqueKey,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct TestGenerator {
    width: u32,
    height: u32,
    fail: bool,
    decodes: AtomicUsize,
}

impl TestGenerator {
    fn new(width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            width,
            height,
            fail: false,
            decodes: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            width: 4,
            height: 4,
            fail: true,
            decodes: AtomicUsize::new(0),
        })
    }

    fn decodes(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }
}

impl ImageGenerator for TestGenerator {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn make_buffer(&self) -> Result<ImageBuffer, Error> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Decode("truncated data".to_string()));
        }
        let pixels = vec![Rgba::new(200, 100, 50, 255); (self.width * self.height) as usize];
        ImageBuffer::from_rgba(pixels, self.width, self.height)
    }
}

fn encoded(key: UniqueKey, generator: &Arc<TestGenerator>) -> Arc<ImageSource> {
    let generator: Arc<dyn ImageGenerator> = generator.clone();
    ImageSource::make_from_generator(key, Some(generator)).unwrap()
}

fn buffer(width: u32, height: u32) -> Arc<ImageBuffer> {
    Arc::new(ImageBuffer::from_alpha(vec![128; (width * height) as usize], width, height).unwrap())
}

fn counting_context() -> (Arc<HeadlessDevice>, Context) {
    let device = Arc::new(HeadlessDevice::new());
    let context = Context::with_device(device.clone(), ContextOptions::default());
    (device, context)
}

fn assert_same(a: &Arc<ImageSource>, b: &Arc<ImageSource>) {
    assert!(Arc::ptr_eq(a, b), "expected {a:?} and {b:?} to be the same source");
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn factories_set_weak_self_reference() {
    let context = Context::headless();
    let texture = Texture::from_buffer(&context, &buffer(2, 2), false).unwrap();
    let sources = [
        encoded(UniqueKey::new(), &TestGenerator::new(2, 2)),
        ImageSource::make_from_buffer(UniqueKey::new(), Some(buffer(2, 2))).unwrap(),
        ImageSource::make_from_texture(UniqueKey::new(), Some(texture)).unwrap(),
    ];

    for source in &sources {
        let resolved = source.weak_this().upgrade().unwrap();
        assert_same(&resolved, source);
        assert_same(&source.shared(), source);
    }
}

#[test]
fn factories_reject_absent_input() {
    for key in [UniqueKey::new(), UniqueKey::EMPTY] {
        assert!(ImageSource::make_from_generator(key, None).is_none());
        assert!(ImageSource::make_from_buffer(key, None).is_none());
        assert!(ImageSource::make_from_texture(key, None).is_none());
    }
}

#[test]
fn factories_report_kind_and_size() {
    let context = Context::headless();
    let lazy = encoded(UniqueKey::new(), &TestGenerator::new(3, 5));
    assert!(lazy.is_lazy_generated());
    assert!(!lazy.is_texture_backed());
    assert!(!lazy.has_mipmaps());
    assert_eq!(lazy.size(), glam::UVec2::new(3, 5));

    let buffered = ImageSource::make_from_buffer(UniqueKey::new(), Some(buffer(4, 2))).unwrap();
    assert!(!buffered.is_lazy_generated());
    assert!(buffered.is_alpha_only());
    assert_eq!(buffered.size(), glam::UVec2::new(4, 2));
    assert!(buffered.texture().is_none());

    let texture = Texture::from_buffer(&context, &buffer(8, 8), true).unwrap();
    let backed = ImageSource::make_from_texture(UniqueKey::new(), Some(texture)).unwrap();
    assert!(backed.is_texture_backed());
    assert!(!backed.is_lazy_generated());
    assert!(backed.has_mipmaps());
    assert_eq!(backed.width(), 8);
}

#[test]
fn make_from_texture_assigns_key_to_texture() {
    let context = Context::headless();
    let texture = Texture::from_buffer(&context, &buffer(2, 2), false).unwrap();
    let key = UniqueKey::new();

    let source = ImageSource::make_from_texture(key, Some(texture.clone())).unwrap();
    assert_eq!(source.unique_key(), key);
    assert_eq!(texture.unique_key(), key);
    let cached = context.resource_cache().find_unique_resource(key).unwrap();
    assert!(Arc::ptr_eq(&cached, &texture));
    assert!(Arc::ptr_eq(source.texture().unwrap(), &texture));
}

// ============================================================================
// makeTextureSource
// ============================================================================

#[test]
fn make_texture_source_uploads_once_then_hits_cache() {
    init_logger();
    let (device, context) = counting_context();
    let key = UniqueKey::new();
    let generator = TestGenerator::new(4, 4);
    let source = encoded(key, &generator);

    let first = source.make_texture_source(&context).unwrap();
    assert!(first.is_texture_backed());
    assert_eq!(first.unique_key(), key);
    assert_eq!(generator.decodes(), 1);
    assert_eq!(device.allocation_count(), 1);

    let proxy = context.proxy_provider().find_proxy_by_unique_key(key).unwrap();
    assert!(proxy.is_instantiated());
    let texture = first.texture().unwrap().clone();
    assert!(Arc::ptr_eq(&proxy.get_texture().unwrap(), &texture));
    assert_eq!(texture.unique_key(), key);

    let second = source.make_texture_source(&context).unwrap();
    assert!(Arc::ptr_eq(second.texture().unwrap(), &texture));
    assert_eq!(generator.decodes(), 1);
    assert_eq!(device.allocation_count(), 1);
}

#[test]
fn make_texture_source_of_texture_source_keeps_texture() {
    let (device, context) = counting_context();
    let texture = Texture::from_buffer(&context, &buffer(2, 2), false).unwrap();
    let source = ImageSource::make_from_texture(UniqueKey::new(), Some(texture.clone())).unwrap();

    let result = source.make_texture_source(&context).unwrap();
    assert!(Arc::ptr_eq(result.texture().unwrap(), &texture));
    assert_eq!(device.allocation_count(), 1);
}

#[test]
fn make_texture_source_fails_when_decoding_fails() {
    let context = Context::headless();
    let source = encoded(UniqueKey::new(), &TestGenerator::failing());
    assert!(source.make_texture_source(&context).is_none());
}

#[test]
fn make_texture_source_fails_when_too_large() {
    let context = Context::headless();
    let side = HeadlessDevice::MAX_TEXTURE_DIMENSION * 2;
    let source = encoded(UniqueKey::new(), &TestGenerator::new(side, 1));
    assert!(source.make_texture_source(&context).is_none());
}

#[test]
fn make_texture_source_recovers_after_device_failure() {
    let (device, context) = counting_context();
    let key = UniqueKey::new();
    let source = ImageSource::make_from_buffer(key, Some(buffer(2, 2))).unwrap();

    device.set_fail_allocations(true);
    assert!(source.make_texture_source(&context).is_none());
    assert!(context.proxy_provider().find_proxy_by_unique_key(key).is_none());

    device.set_fail_allocations(false);
    let fresh = ImageSource::make_from_buffer(key, Some(buffer(2, 2))).unwrap();
    let texture_source = fresh.make_texture_source(&context).unwrap();
    assert_eq!(texture_source.texture().unwrap().unique_key(), key);
    assert_eq!(device.allocation_count(), 1);

    // The original source now hits the cache as well.
    let again = source.make_texture_source(&context).unwrap();
    assert!(Arc::ptr_eq(again.texture().unwrap(), texture_source.texture().unwrap()));
    assert_eq!(device.allocation_count(), 1);
}

#[test]
fn sources_without_key_do_not_share_textures() {
    let (device, context) = counting_context();
    let generator = TestGenerator::new(2, 2);
    let a = encoded(UniqueKey::EMPTY, &generator);
    let b = encoded(UniqueKey::EMPTY, &generator);

    let ta = a.make_texture_source(&context).unwrap();
    let tb = b.make_texture_source(&context).unwrap();
    assert!(!Arc::ptr_eq(ta.texture().unwrap(), tb.texture().unwrap()));
    assert_eq!(device.allocation_count(), 2);
    assert!(context.resource_cache().is_empty());
    assert!(context.proxy_provider().is_empty());
}

// ============================================================================
// lockTextureProxy
// ============================================================================

#[test]
fn lock_texture_proxy_requires_context() {
    let source = ImageSource::make_from_buffer(UniqueKey::new(), Some(buffer(2, 2))).unwrap();
    assert!(source
        .lock_texture_proxy(None, SurfaceFlags::empty())
        .is_none());
}

#[test]
fn lock_texture_proxy_reuses_registered_proxy() {
    let context = Context::headless();
    let key = UniqueKey::new();
    let source = encoded(key, &TestGenerator::new(2, 2));

    let first = source
        .lock_texture_proxy(Some(&context), SurfaceFlags::DISABLE_ASYNC_TASK)
        .unwrap();
    assert!(!first.is_instantiated());
    let second = source
        .lock_texture_proxy(Some(&context), SurfaceFlags::DISABLE_ASYNC_TASK)
        .unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.unique_key(), key);

    // A different source with the same key gets the same proxy too.
    let other = ImageSource::make_from_buffer(key, Some(buffer(2, 2))).unwrap();
    let third = other
        .lock_texture_proxy(Some(&context), SurfaceFlags::empty())
        .unwrap();
    assert!(Arc::ptr_eq(&first, &third));
}

#[test]
fn lock_texture_proxy_defers_decoding_until_instantiation() {
    let context = Context::headless();
    let key = UniqueKey::new();
    let generator = TestGenerator::new(2, 2);
    let source = encoded(key, &generator);

    let proxy = source
        .lock_texture_proxy(Some(&context), SurfaceFlags::DISABLE_ASYNC_TASK)
        .unwrap();
    assert_eq!(generator.decodes(), 0);
    assert!(proxy.instantiate());
    assert_eq!(generator.decodes(), 1);
    assert_eq!(proxy.get_texture().unwrap().unique_key(), key);
}

#[test]
fn lock_texture_proxy_with_async_decoding() {
    let context = Context::headless();
    let key = UniqueKey::new();
    let generator = TestGenerator::new(16, 8);
    let source = encoded(key, &generator);

    let proxy = source
        .lock_texture_proxy(Some(&context), SurfaceFlags::empty())
        .unwrap();
    assert!(proxy.instantiate());
    assert_eq!(generator.decodes(), 1);
    assert!(context.resource_cache().has_unique_resource(key));
}

#[test]
fn many_async_proxies_use_a_fixed_number_of_threads() {
    let context = Context::headless();
    let generator = TestGenerator::new(8, 8);
    let proxies: Vec<_> = (0..300)
        .map(|_| {
            encoded(UniqueKey::new(), &generator)
                .lock_texture_proxy(Some(&context), SurfaceFlags::empty())
                .unwrap()
        })
        .collect();
    let threads = context.proxy_provider().decode_thread_count();
    assert!(threads <= 4, "{threads} decode threads");

    for proxy in &proxies {
        assert!(proxy.instantiate());
    }
    assert_eq!(generator.decodes(), 300);
    assert_eq!(context.proxy_provider().decode_thread_count(), threads);
}

#[test]
fn disable_cache_keeps_key_off_texture() {
    let context = Context::headless();
    let key = UniqueKey::new();
    let source = ImageSource::make_from_buffer(key, Some(buffer(2, 2))).unwrap();

    let proxy = source
        .lock_texture_proxy(Some(&context), SurfaceFlags::DISABLE_CACHE)
        .unwrap();
    assert!(proxy.instantiate());

    assert!(proxy.get_texture().unwrap().unique_key().is_empty());
    assert!(!context.resource_cache().has_unique_resource(key));
    let registered = context.proxy_provider().find_proxy_by_unique_key(key).unwrap();
    assert!(Arc::ptr_eq(&registered, &proxy));
}

#[test]
fn texture_backed_source_does_not_rekey_its_texture() {
    let context = Context::headless();
    let key = UniqueKey::new();
    let texture = Texture::from_buffer(&context, &buffer(2, 2), false).unwrap();
    let source = ImageSource::make_from_texture(key, Some(texture.clone())).unwrap();
    texture.remove_unique_key();

    let proxy = source
        .lock_texture_proxy(Some(&context), SurfaceFlags::empty())
        .unwrap();
    assert!(proxy.is_instantiated());
    assert!(Arc::ptr_eq(&proxy.get_texture().unwrap(), &texture));
    assert!(texture.unique_key().is_empty());
    assert_eq!(proxy.unique_key(), key);
}

// ============================================================================
// makeDecoded
// ============================================================================

#[test]
fn make_decoded_returns_self_when_not_lazy() {
    let context = Context::headless();
    let source = ImageSource::make_from_buffer(UniqueKey::new(), Some(buffer(2, 2))).unwrap();
    let via_weak = source.weak_this().upgrade().unwrap();

    assert_same(&source.make_decoded(None), &via_weak);
    assert_same(&source.make_decoded(Some(&context)), &via_weak);

    let texture = Texture::from_buffer(&context, &buffer(2, 2), false).unwrap();
    let backed = ImageSource::make_from_texture(UniqueKey::new(), Some(texture)).unwrap();
    assert_same(&backed.make_decoded(None), &backed);
}

#[test]
fn make_decoded_promotes_lazy_source() {
    let key = UniqueKey::new();
    let generator = TestGenerator::new(3, 3);
    let source = encoded(key, &generator);

    let decoded = source.make_decoded(None);
    assert!(!Arc::ptr_eq(&decoded, &source));
    assert!(!decoded.is_lazy_generated());
    assert_eq!(decoded.unique_key(), key);
    assert_eq!(decoded.size(), source.size());
    assert_eq!(generator.decodes(), 1);
    assert_same(&decoded.weak_this().upgrade().unwrap(), &decoded);

    // Decoding again is a no-op on the decoded source.
    assert_same(&decoded.make_decoded(None), &decoded);
    assert_eq!(generator.decodes(), 1);
}

#[test]
fn make_decoded_falls_back_to_self_on_failure() {
    let generator = TestGenerator::failing();
    let source = encoded(UniqueKey::new(), &generator);
    assert_same(&source.make_decoded(None), &source);
    assert_eq!(generator.decodes(), 1);
}

#[test]
fn make_decoded_skips_work_when_context_has_texture() {
    let context = Context::headless();
    let key = UniqueKey::new();
    let generator = TestGenerator::new(2, 2);
    let source = encoded(key, &generator);
    source.make_texture_source(&context).unwrap();
    assert_eq!(generator.decodes(), 1);

    assert_same(&source.make_decoded(Some(&context)), &source);
    assert_eq!(generator.decodes(), 1);
}

#[test]
fn decoded_sources_with_same_key_share_proxy() {
    let (device, context) = counting_context();
    let key = UniqueKey::new();
    let first = encoded(key, &TestGenerator::new(2, 2));
    let second = encoded(key, &TestGenerator::new(2, 2));

    let first_proxy = first
        .make_decoded(Some(&context))
        .lock_texture_proxy(Some(&context), SurfaceFlags::empty())
        .unwrap();
    let second_proxy = second
        .make_decoded(Some(&context))
        .lock_texture_proxy(Some(&context), SurfaceFlags::empty())
        .unwrap();
    assert!(Arc::ptr_eq(&first_proxy, &second_proxy));

    assert!(first_proxy.instantiate());
    assert!(second_proxy.instantiate());
    assert_eq!(device.allocation_count(), 1);
}

// ============================================================================
// makeMipMapped
// ============================================================================

#[test]
fn make_mipmapped_returns_self_when_already_mipmapped() {
    let generator = TestGenerator::new(8, 8);
    let source = encoded(UniqueKey::new(), &generator);
    let mipmapped = source.make_mipmapped();
    assert!(mipmapped.has_mipmaps());
    assert!(!Arc::ptr_eq(&mipmapped, &source));

    assert_same(&mipmapped.make_mipmapped(), &mipmapped);
    assert_eq!(generator.decodes(), 0);
}

#[test]
fn make_mipmapped_gives_new_identity() {
    let context = Context::headless();
    let key = UniqueKey::new();
    let source = ImageSource::make_from_buffer(key, Some(buffer(8, 4))).unwrap();

    let mipmapped = source.make_mipmapped();
    assert!(mipmapped.has_mipmaps());
    assert!(!mipmapped.unique_key().is_empty());
    assert_ne!(mipmapped.unique_key(), key);
    assert_same(&mipmapped.weak_this().upgrade().unwrap(), &mipmapped);

    let texture_source = mipmapped.make_texture_source(&context).unwrap();
    assert_eq!(texture_source.texture().unwrap().mip_level_count(), 4);
}

#[test]
fn make_mipmapped_falls_back_for_plain_texture() {
    let context = Context::headless();
    let texture = Texture::from_buffer(&context, &buffer(4, 4), false).unwrap();
    let source = ImageSource::make_from_texture(UniqueKey::new(), Some(texture)).unwrap();
    assert!(!source.has_mipmaps());
    assert_same(&source.make_mipmapped(), &source);
}

#[test]
fn decoded_keeps_mipmap_request() {
    let generator = TestGenerator::new(4, 4);
    let source = encoded(UniqueKey::new(), &generator).make_mipmapped();
    let decoded = source.make_decoded(None);
    assert!(!decoded.is_lazy_generated());
    assert!(decoded.has_mipmaps());
    assert_eq!(decoded.unique_key(), source.unique_key());
}

// ============================================================================
// Context
// ============================================================================

#[test]
fn purge_resources_releases_unused_entries() {
    let context = Context::new(HeadlessDevice::new(), ContextOptions { cache_limit: 0 });
    let source = encoded(UniqueKey::new(), &TestGenerator::new(2, 2));
    let texture_source = source.make_texture_source(&context).unwrap();
    assert_eq!(context.proxy_provider().len(), 1);
    assert_eq!(context.resource_cache().len(), 1);

    drop(texture_source);
    context.purge_resources();
    assert!(context.proxy_provider().is_empty());
    assert!(context.resource_cache().is_empty());
}

#[test]
fn public_types_are_thread_safe() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<ImageSource>();
    assert_send_sync::<Context>();
    assert_send_sync::<Texture>();
    assert_send_sync::<texsource::TextureProxy>();
}
