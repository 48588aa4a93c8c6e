use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use material_forge::error::{BackendError, ShaderMapError};
use material_forge::shader_map::cache::translate;
use material_forge::shader_map::{
    CompileJob, CompiledStages, NagaBackend, ShaderBackend, ShaderMapEntry, StaticSwitchSet,
};
use material_forge::types::{Platform, Quality, ShaderFrequency};
use material_forge::{CompilerConfig, Material, ShaderMapCache, ShaderMapKey};

/// Backend that counts compiles and can be told to reject everything.
struct CountingBackend {
    compiles: AtomicUsize,
    delay: Duration,
    reject: bool,
}

impl CountingBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            compiles: AtomicUsize::new(0),
            delay: Duration::ZERO,
            reject: false,
        })
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            compiles: AtomicUsize::new(0),
            delay,
            reject: false,
        })
    }

    fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            compiles: AtomicUsize::new(0),
            delay: Duration::ZERO,
            reject: true,
        })
    }

    fn compiles(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }
}

impl ShaderBackend for CountingBackend {
    fn name(&self) -> &str {
        "counting"
    }

    fn compile(&self, job: &CompileJob) -> Result<CompiledStages, BackendError> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        if self.reject {
            return Err(BackendError::new(format!("{} rejected", job.friendly_name)));
        }
        let mut stages = CompiledStages::new();
        stages.insert(ShaderFrequency::Vertex, vec![0x03, 0x02, 0x23, 0x07]);
        stages.insert(ShaderFrequency::Pixel, vec![0x03, 0x02, 0x23, 0x07]);
        Ok(stages)
    }
}

fn load_case(name: &str) -> Material {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("cases")
        .join(name);
    Material::load_from_path(&path).expect("load case")
}

fn key_for(material: &Material) -> ShaderMapKey {
    CompilerConfig::default().key_for(material.id())
}

#[test]
fn concurrent_requests_share_one_compile() {
    let backend = CountingBackend::slow(Duration::from_millis(50));
    let cache = Arc::new(ShaderMapCache::new(backend.clone()));
    let material = Arc::new(load_case("dissolve_glow.json"));
    let key = key_for(&material);

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let cache = cache.clone();
            let material = material.clone();
            let key = key.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                cache.get_or_compile(&material, &key)
            })
        })
        .collect();

    let maps: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("thread panicked").expect("compile"))
        .collect();

    assert_eq!(backend.compiles(), 1);
    assert!(maps.iter().all(|m| Arc::ptr_eq(m, &maps[0])));
    assert!(maps[0].is_complete());
    assert_eq!(cache.len(), 1);
}

#[test]
fn keys_differing_only_by_switches_compile_separately() {
    let backend = CountingBackend::new();
    let cache = ShaderMapCache::new(backend.clone());
    let material = load_case("textured_switch.json");
    let dry = key_for(&material);
    let wet = dry
        .clone()
        .with_switches(StaticSwitchSet::new().with_bool("Wet", true));

    let dry_map = cache.get_or_compile(&material, &dry).expect("dry");
    let wet_map = cache.get_or_compile(&material, &wet).expect("wet");
    cache.get_or_compile(&material, &dry).expect("dry again");

    assert_eq!(backend.compiles(), 2);
    assert_ne!(dry_map.shader_text, wet_map.shader_text);
    assert!(cache.is_ready(&dry));
    assert!(cache.is_ready(&wet));
}

#[test]
fn translation_failures_are_reported_and_not_cached() {
    let backend = CountingBackend::new();
    let cache = ShaderMapCache::new(backend.clone());
    let material = load_case("cyclic_function.json");
    let key = key_for(&material);

    let err = cache.get_or_compile(&material, &key).unwrap_err();
    assert!(matches!(err, ShaderMapError::Translation { .. }));
    assert!(!err.diagnostics().is_empty());
    assert!(!err.is_fatal());
    assert_eq!(backend.compiles(), 0);
    assert!(!cache.is_ready(&key));
    assert!(cache.is_empty());
}

#[test]
fn broken_materials_fall_back_to_the_default() {
    let backend = CountingBackend::new();
    let cache = ShaderMapCache::new(backend.clone());
    let broken = load_case("cyclic_function.json");
    let fallback = Material::default_material().expect("default material");
    let key = ShaderMapKey::new(broken.id())
        .with_switches(StaticSwitchSet::new().with_bool("Wet", true))
        .with_platform(Platform::Mobile)
        .with_quality(Quality::Low);

    let map = cache
        .get_or_fallback(&broken, &key, &fallback)
        .expect("fallback compiles");
    assert_eq!(map.friendly_name, "DefaultMaterial");
    assert_eq!(map.key.material_id, fallback.id());
    assert_eq!(map.key.platform, Platform::Mobile);
    assert_eq!(map.key.quality, Quality::Low);
    assert!(map.key.static_switches.is_empty());
}

#[test]
fn a_failing_fallback_is_fatal() {
    let cache = ShaderMapCache::new(CountingBackend::rejecting());
    let broken = load_case("cyclic_function.json");
    let fallback = Material::default_material().expect("default material");

    let err = cache
        .get_or_fallback(&broken, &key_for(&broken), &fallback)
        .unwrap_err();
    assert!(err.is_fatal(), "{err}");
    assert!(matches!(err, ShaderMapError::FallbackMaterialFailed { .. }));
}

#[test]
fn background_requests_complete_through_the_worker_pool() {
    let backend = CountingBackend::new();
    let cache = Arc::new(ShaderMapCache::with_workers(backend.clone(), 2).expect("workers"));
    let material = Arc::new(load_case("dissolve_glow.json"));
    let key = key_for(&material);

    let map = cache
        .request(material.clone(), key.clone())
        .wait_timeout(Duration::from_secs(30))
        .expect("compile");
    assert!(map.is_complete());
    assert!(cache.is_ready(&key));

    let again = cache.request(material, key).wait().expect("cached");
    assert!(Arc::ptr_eq(&map, &again));
    assert_eq!(backend.compiles(), 1);
}

#[test]
fn exported_entries_import_and_verify_without_recompiling() {
    let material = load_case("dissolve_glow.json");
    let key = key_for(&material);

    let source = ShaderMapCache::new(CountingBackend::new());
    source.get_or_compile(&material, &key).expect("compile");
    let json = serde_json::to_string(&source.export_entries()).expect("serialize");

    let backend = CountingBackend::new();
    let restored = ShaderMapCache::new(backend.clone());
    let entries: Vec<ShaderMapEntry> = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(restored.import_entries(entries).expect("import"), 1);
    assert!(!restored.is_ready(&key), "imported maps start unverified");

    let map = restored.get_or_compile(&material, &key).expect("verify");
    assert_eq!(backend.compiles(), 0);
    assert!(map.is_complete());
    assert!(restored.is_ready(&key));
}

#[test]
fn stale_imported_entries_are_recompiled() {
    let material = load_case("dissolve_glow.json");
    let key = key_for(&material);

    let source = ShaderMapCache::new(CountingBackend::new());
    source.get_or_compile(&material, &key).expect("compile");
    let mut entries = source.export_entries();
    entries[0].uniform_expression_set = Default::default();

    let backend = CountingBackend::new();
    let restored = ShaderMapCache::new(backend.clone());
    restored.import_entries(entries).expect("import");
    let map = restored.get_or_compile(&material, &key).expect("recompile");

    assert_eq!(backend.compiles(), 1);
    assert!(!map.uniform_expression_set.is_empty());
}

#[test]
fn imported_entries_with_different_bindings_are_recompiled() {
    let material = load_case("dissolve_glow.json");
    let key = key_for(&material);

    let source = ShaderMapCache::new(CountingBackend::new());
    source.get_or_compile(&material, &key).expect("compile");
    let mut entries = source.export_entries();
    let other = load_case("textured_switch.json");
    let other_set = translate(&other, &key_for(&other)).uniform_expression_set;
    assert!(!other_set.is_empty());
    entries[0].uniform_expression_set = other_set.clone();

    let backend = CountingBackend::new();
    let restored = ShaderMapCache::new(backend.clone());
    restored.import_entries(entries).expect("import");
    let map = restored.get_or_compile(&material, &key).expect("recompile");

    assert_eq!(backend.compiles(), 1);
    assert_ne!(map.uniform_expression_set, other_set);
    assert_eq!(
        map.uniform_expression_set,
        translate(&material, &key).uniform_expression_set
    );
}

/// Backend whose first compile panics.
struct PanicsOnceBackend {
    compiles: AtomicUsize,
}

impl ShaderBackend for PanicsOnceBackend {
    fn name(&self) -> &str {
        "panics-once"
    }

    fn compile(&self, _job: &CompileJob) -> Result<CompiledStages, BackendError> {
        if self.compiles.fetch_add(1, Ordering::SeqCst) == 0 {
            thread::sleep(Duration::from_millis(50));
            panic!("backend crashed");
        }
        let mut stages = CompiledStages::new();
        stages.insert(ShaderFrequency::Vertex, vec![0x03, 0x02, 0x23, 0x07]);
        stages.insert(ShaderFrequency::Pixel, vec![0x03, 0x02, 0x23, 0x07]);
        Ok(stages)
    }
}

#[test]
fn a_panicking_compile_releases_its_waiters() {
    let backend = Arc::new(PanicsOnceBackend {
        compiles: AtomicUsize::new(0),
    });
    let cache = Arc::new(ShaderMapCache::new(backend.clone()));
    let material = Arc::new(load_case("dissolve_glow.json"));
    let key = key_for(&material);

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let cache = cache.clone();
            let material = material.clone();
            let key = key.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                cache.get_or_compile(&material, &key)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join()).collect();

    assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
    let map = results
        .into_iter()
        .find_map(|r| r.ok())
        .expect("one thread survives")
        .expect("retry compiles");
    assert!(map.is_complete());
    assert!(cache.is_ready(&key));
    assert_eq!(backend.compiles.load(Ordering::SeqCst), 2);
}

#[test]
fn naga_backend_compiles_generated_materials() {
    let cache = ShaderMapCache::new(Arc::new(NagaBackend::new()));
    let material = load_case("dissolve_glow.json");
    let map = cache
        .get_or_compile(&material, &key_for(&material))
        .expect("naga compile");

    let entry = map.to_entry();
    assert!(entry.compiled_stages.contains_key(&ShaderFrequency::Vertex));
    assert!(entry.compiled_stages.contains_key(&ShaderFrequency::Pixel));
}
