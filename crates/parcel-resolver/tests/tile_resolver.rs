// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use async_trait::async_trait;
use parcel_core::{
    CatalogSource, ContentFetcher, ContentMapping, EmptyTileCatalog, EntityKind, LifecycleConfig,
    ResolveError, ResolverConfig, SceneId, SceneJson, SceneMappingEntry, SceneParcels,
    SceneRecord, Tile,
};
use parcel_resolver::{EmptyTileSynthesizer, TileResolver, RESOLVER_NAMESPACE};
use parcel_telemetry::MetricsRegistry;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// In-memory content service recording every batch it receives.
struct FakeContentService {
    scenes: Vec<SceneRecord>,
    calls: Mutex<Vec<Vec<Tile>>>,
    gate: Option<Semaphore>,
    failures_left: AtomicU32,
    unfiltered: bool,
}

impl FakeContentService {
    fn new(scenes: Vec<SceneRecord>) -> Self {
        Self {
            scenes,
            calls: Mutex::new(Vec::new()),
            gate: None,
            failures_left: AtomicU32::new(0),
            unfiltered: false,
        }
    }

    /// Holds every fetch until [`open`](Self::open) is called.
    fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    /// Answers every batch with all known scenes, asked for or not.
    fn unfiltered(mut self) -> Self {
        self.unfiltered = true;
        self
    }

    fn failing(self, times: u32) -> Self {
        self.failures_left.store(times, Ordering::SeqCst);
        self
    }

    fn open(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    fn calls(&self) -> Vec<Vec<Tile>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentFetcher for FakeContentService {
    async fn fetch_scenes_by_pointers(
        &self,
        kind: EntityKind,
        pointers: &[Tile],
    ) -> anyhow::Result<Vec<SceneRecord>> {
        assert_eq!(kind, EntityKind::Scene);
        self.calls.lock().unwrap().push(pointers.to_vec());

        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await?;
        }

        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            anyhow::bail!("content server returned 503");
        }

        Ok(self
            .scenes
            .iter()
            .filter(|scene| {
                self.unfiltered || scene.pointers.iter().any(|p| pointers.contains(p))
            })
            .cloned()
            .collect())
    }
}

struct FakeCatalog {
    calls: AtomicUsize,
}

#[async_trait]
impl CatalogSource for FakeCatalog {
    async fn fetch_catalog(&self, base_url: &str) -> anyhow::Result<EmptyTileCatalog> {
        assert!(base_url.ends_with("/loader/empty-scenes/"));
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut entries = BTreeMap::new();
        entries.insert(
            "Flowers".to_string(),
            vec![ContentMapping::new("bin/game.js", "QmFlowers")],
        );
        Ok(EmptyTileCatalog::new(entries))
    }
}

fn scene(id: &str, pointers: &[&str]) -> SceneRecord {
    let parcels: Vec<Tile> = pointers.iter().map(|p| Tile::new(*p)).collect();
    SceneRecord {
        id: SceneId::new(id),
        pointers: parcels.clone(),
        content: vec![ContentMapping::new("game.js", format!("{id}-game"))],
        metadata: Some(SceneJson {
            main: "game.js".to_string(),
            scene: SceneParcels {
                base: parcels[0].clone(),
                parcels,
            },
            ..SceneJson::default()
        }),
    }
}

struct Harness {
    resolver: Arc<TileResolver>,
    content: Arc<FakeContentService>,
    catalog: Arc<FakeCatalog>,
    registry: MetricsRegistry,
}

fn harness_with(content: FakeContentService, lifecycle: LifecycleConfig) -> Harness {
    let content = Arc::new(content);
    let catalog = Arc::new(FakeCatalog {
        calls: AtomicUsize::new(0),
    });
    let registry = MetricsRegistry::new();
    let resolver = TileResolver::new(lifecycle, content.clone(), catalog.clone())
        .with_resolver_config(ResolverConfig {
            fetch_retries: 1,
            retry_backoff_ms: 1,
        })
        .with_metrics(&registry);

    Harness {
        resolver: Arc::new(resolver),
        content,
        catalog,
        registry,
    }
}

fn harness(content: FakeContentService) -> Harness {
    harness_with(content, LifecycleConfig::default())
}

async fn wait_for_calls(content: &FakeContentService, expected: usize) {
    for _ in 0..200 {
        if content.calls().len() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("expected {expected} fetches, saw {:?}", content.calls());
}

#[tokio::test]
async fn concurrent_requests_for_one_tile_share_a_fetch() {
    let h = harness(FakeContentService::new(vec![scene("QmPlaza", &["5,5"])]).gated());
    let tile = Tile::new("5,5");

    let first = {
        let resolver = Arc::clone(&h.resolver);
        let tile = tile.clone();
        tokio::spawn(async move { resolver.resolve_tile(&tile).await })
    };
    wait_for_calls(&h.content, 1).await;

    let second = {
        let resolver = Arc::clone(&h.resolver);
        let tile = tile.clone();
        tokio::spawn(async move { resolver.resolve_tile(&tile).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    h.content.open();

    let expected = Some(SceneId::new("QmPlaza"));
    assert_eq!(first.await.unwrap(), Ok(expected.clone()));
    assert_eq!(second.await.unwrap(), Ok(expected));
    assert_eq!(h.content.calls().len(), 1);
    assert_eq!(h.registry.counter_value(RESOLVER_NAMESPACE, "fetch_batches"), Some(1));
    assert_eq!(h.registry.counter_value(RESOLVER_NAMESPACE, "cache_hits"), Some(1));
}

#[tokio::test]
async fn wider_scene_resolves_tiles_nobody_asked_for() {
    let h = harness(FakeContentService::new(vec![scene(
        "QmStrip",
        &["0,0", "1,0", "2,0"],
    )]));

    let resolved = h
        .resolver
        .resolve_tiles(&[Tile::new("0,0"), Tile::new("1,0")])
        .await
        .unwrap();

    let strip = Some(SceneId::new("QmStrip"));
    assert_eq!(
        resolved,
        vec![
            (Tile::new("0,0"), strip.clone()),
            (Tile::new("1,0"), strip.clone()),
        ]
    );
    assert_eq!(h.resolver.cached_tile_count(), 3);

    assert_eq!(h.resolver.resolve_tile(&Tile::new("2,0")).await, Ok(strip));
    assert_eq!(h.content.calls(), vec![vec![Tile::new("0,0"), Tile::new("1,0")]]);
}

#[tokio::test]
async fn duplicate_tiles_in_one_call_are_fetched_once() {
    let h = harness(FakeContentService::new(Vec::new()));
    let a = Tile::new("3,3");
    let b = Tile::new("4,4");

    let resolved = h
        .resolver
        .resolve_tiles(&[a.clone(), a.clone(), b.clone()])
        .await
        .unwrap();

    assert_eq!(resolved.len(), 3);
    assert_eq!(h.content.calls(), vec![vec![a, b]]);
}

#[tokio::test]
async fn empty_tile_is_synthesized_from_a_single_catalog_load() {
    let h = harness(FakeContentService::new(Vec::new()));
    let tile = Tile::new("99,99");

    assert_eq!(h.resolver.resolve_tile(&tile).await, Ok(None));

    let empty_id = EmptyTileSynthesizer::empty_scene_id(&tile);
    let first = h.resolver.resolve_land_data(&empty_id).await.unwrap();
    let second = h.resolver.resolve_land_data(&empty_id).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.scene_json_data.scene.base, tile);
    assert_eq!(first.mappings_response.contents[0].hash, "QmFlowers");
    assert_eq!(h.catalog.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.content.calls().len(), 1);
    assert_eq!(
        h.registry.counter_value(RESOLVER_NAMESPACE, "empty_synthesized"),
        Some(1)
    );
    assert_eq!(h.resolver.get_tile_by_scene_id(&empty_id), Some(tile));
}

#[tokio::test]
async fn empty_ids_are_unknown_when_empty_scenes_are_disabled() {
    let lifecycle = LifecycleConfig {
        empty_scenes: false,
        ..LifecycleConfig::default()
    };
    let h = harness_with(FakeContentService::new(Vec::new()), lifecycle);
    let empty_id = EmptyTileSynthesizer::empty_scene_id(&Tile::new("7,7"));

    let result = h.resolver.resolve_land_data(&empty_id).await;

    assert_eq!(result, Err(ResolveError::NotFound { scene_id: empty_id }));
    assert_eq!(h.catalog.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_scene_id_fails_without_touching_the_cache() {
    let h = harness(FakeContentService::new(Vec::new()));
    let unknown = SceneId::new("QmNeverSeen");

    let result = h.resolver.resolve_land_data(&unknown).await;

    assert_eq!(result, Err(ResolveError::NotFound { scene_id: unknown }));
    assert_eq!(h.resolver.cached_scene_count(), 0);
    assert!(h.content.calls().is_empty());
}

#[tokio::test]
async fn land_data_comes_from_the_tile_fetch_and_is_stable() {
    let h = harness(FakeContentService::new(vec![scene("QmMuseum", &["10,-4", "11,-4"])]));
    let tile = Tile::new("11,-4");

    let scene_id = h.resolver.resolve_tile(&tile).await.unwrap().unwrap();
    let first = h.resolver.resolve_land_data(&scene_id).await.unwrap();
    let second = h.resolver.resolve_land_data(&scene_id).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.base_url, "https://peer.decentraland.org/content/contents/");
    assert_eq!(
        first.content_provider().contents_url("GAME.js"),
        Some("https://peer.decentraland.org/content/contents/QmMuseum-game".to_string())
    );
    assert_eq!(
        h.resolver.get_tile_by_scene_id(&scene_id),
        Some(Tile::new("10,-4"))
    );
    let by_tile = h.resolver.get_land_data_by_tile(&tile).await.unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &by_tile));
    assert_eq!(h.content.calls().len(), 1);
}

#[tokio::test]
async fn lookups_never_create_placeholders() {
    let h = harness(FakeContentService::new(Vec::new()));

    assert_eq!(
        h.resolver.get_land_data_by_tile(&Tile::new("1,2")).await,
        Ok(None)
    );
    assert_eq!(h.resolver.get_tile_by_scene_id(&SceneId::new("QmX")), None);
    assert!(h.resolver.land_data_by_scene_id(&SceneId::new("QmX")).is_none());
    assert_eq!(h.resolver.cached_tile_count(), 0);
    assert_eq!(h.resolver.cached_scene_count(), 0);
}

#[tokio::test]
async fn failed_fetch_is_retried_then_rejected_and_forgotten() {
    let h = harness(FakeContentService::new(vec![scene("QmLate", &["8,8"])]).failing(2));
    let tile = Tile::new("8,8");

    let result = h.resolver.resolve_tile(&tile).await;
    assert!(matches!(result, Err(ResolveError::UpstreamFetch(_))));
    assert_eq!(h.content.calls().len(), 2);
    assert_eq!(h.resolver.cached_tile_count(), 0);

    assert_eq!(
        h.resolver.resolve_tile(&tile).await,
        Ok(Some(SceneId::new("QmLate")))
    );
    assert_eq!(h.content.calls().len(), 3);
}

#[tokio::test]
async fn settled_variant_reports_each_tile() {
    let h = harness(FakeContentService::new(vec![scene("QmA", &["1,1"])]));

    let outcomes = h
        .resolver
        .resolve_tiles_settled(&[Tile::new("1,1"), Tile::new("2,2")])
        .await;

    assert_eq!(
        outcomes,
        vec![
            (Tile::new("1,1"), Ok(Some(SceneId::new("QmA")))),
            (Tile::new("2,2"), Ok(None)),
        ]
    );
}

#[tokio::test]
async fn scene_roots_seed_tiles_without_fetching() {
    let h = harness(FakeContentService::new(Vec::new()));

    h.resolver.set_scene_roots(vec![
        SceneMappingEntry {
            parcel_id: Tile::new("-1,-1"),
            root_cid: SceneId::new("QmSeeded"),
        },
        SceneMappingEntry {
            parcel_id: Tile::new("-1,-2"),
            root_cid: SceneId::new("QmSeeded"),
        },
    ]);

    assert_eq!(
        h.resolver.resolve_tile(&Tile::new("-1,-2")).await,
        Ok(Some(SceneId::new("QmSeeded")))
    );
    assert!(h.content.calls().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn land_data_is_ready_when_a_tile_resolves() {
    for _ in 0..5 {
        let mut scenes = vec![scene("QmFirst", &["0,0"])];
        for x in 1..=1000 {
            let pointers: Vec<String> = (0..50).map(|y| format!("{x},{y}")).collect();
            let pointers: Vec<&str> = pointers.iter().map(String::as_str).collect();
            scenes.push(scene(&format!("QmBulk{x}"), &pointers));
        }
        let h = harness_with(
            FakeContentService::new(scenes).gated().unfiltered(),
            LifecycleConfig {
                empty_scenes: false,
                ..LifecycleConfig::default()
            },
        );

        let first = {
            let resolver = Arc::clone(&h.resolver);
            tokio::spawn(async move { resolver.resolve_tile(&Tile::new("0,0")).await })
        };
        wait_for_calls(&h.content, 1).await;

        // A waiter on its own thread and runtime, racing the publishing task.
        let resolver = Arc::clone(&h.resolver);
        let waiter = std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let scene_id = resolver.resolve_tile(&Tile::new("0,0")).await?;
                let scene_id = scene_id.expect("0,0 has a scene");
                resolver.resolve_land_data(&scene_id).await
            })
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.content.open();

        assert_eq!(first.await.unwrap(), Ok(Some(SceneId::new("QmFirst"))));
        let land = tokio::task::spawn_blocking(move || waiter.join().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(land.scene_id, SceneId::new("QmFirst"));
    }
}

#[tokio::test]
async fn synthesis_does_not_preempt_a_pending_fetch() {
    let h = harness(FakeContentService::new(vec![scene("QmReal", &["4,4"])]).gated());
    let tile = Tile::new("4,4");

    let fetching = {
        let resolver = Arc::clone(&h.resolver);
        let tile = tile.clone();
        tokio::spawn(async move { resolver.resolve_tile(&tile).await })
    };
    wait_for_calls(&h.content, 1).await;

    let empty_id = EmptyTileSynthesizer::empty_scene_id(&tile);
    let synthesized = h.resolver.resolve_land_data(&empty_id).await.unwrap();
    assert_eq!(synthesized.scene_id, empty_id);

    h.content.open();

    let real = Some(SceneId::new("QmReal"));
    assert_eq!(fetching.await.unwrap(), Ok(real.clone()));
    assert_eq!(h.resolver.resolve_tile(&tile).await, Ok(real));
    assert_eq!(h.content.calls().len(), 1);
}

/// Hands out one scripted reply per fetch, each held by its own gate.
struct ScriptedContentService {
    replies: Mutex<VecDeque<(Arc<Semaphore>, Vec<SceneRecord>)>>,
    calls: AtomicUsize,
}

#[async_trait]
impl ContentFetcher for ScriptedContentService {
    async fn fetch_scenes_by_pointers(
        &self,
        _kind: EntityKind,
        _pointers: &[Tile],
    ) -> anyhow::Result<Vec<SceneRecord>> {
        let reply = self.replies.lock().unwrap().pop_front();
        self.calls.fetch_add(1, Ordering::SeqCst);
        let Some((gate, records)) = reply else {
            anyhow::bail!("no reply scripted");
        };
        let _permit = gate.acquire().await?;
        Ok(records)
    }
}

#[tokio::test]
async fn overlapping_batch_keeps_the_scene_it_published() {
    let slow_gate = Arc::new(Semaphore::new(0));
    let fast_gate = Arc::new(Semaphore::new(0));
    let content = Arc::new(ScriptedContentService {
        replies: Mutex::new(VecDeque::from([
            (Arc::clone(&slow_gate), Vec::new()),
            (Arc::clone(&fast_gate), vec![scene("QmWide", &["1,0", "0,0"])]),
        ])),
        calls: AtomicUsize::new(0),
    });
    let resolver = Arc::new(TileResolver::new(
        LifecycleConfig::default(),
        content.clone(),
        Arc::new(FakeCatalog {
            calls: AtomicUsize::new(0),
        }),
    ));

    let slow = {
        let resolver = Arc::clone(&resolver);
        tokio::spawn(async move { resolver.resolve_tile(&Tile::new("0,0")).await })
    };
    while content.calls.load(Ordering::SeqCst) < 1 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let fast = {
        let resolver = Arc::clone(&resolver);
        tokio::spawn(async move { resolver.resolve_tile(&Tile::new("1,0")).await })
    };
    fast_gate.add_permits(1);
    let wide = Some(SceneId::new("QmWide"));
    assert_eq!(fast.await.unwrap(), Ok(wide.clone()));

    // The first batch finds nothing for 0,0 and must not overwrite it.
    slow_gate.add_permits(1);
    assert_eq!(slow.await.unwrap(), Ok(wide.clone()));
    assert_eq!(resolver.resolve_tile(&Tile::new("0,0")).await, Ok(wide));
    assert_eq!(content.calls.load(Ordering::SeqCst), 2);
}

struct FlakyCatalog {
    failures_left: AtomicU32,
}

#[async_trait]
impl CatalogSource for FlakyCatalog {
    async fn fetch_catalog(&self, _base_url: &str) -> anyhow::Result<EmptyTileCatalog> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            anyhow::bail!("index.json returned 502");
        }
        let mut entries = BTreeMap::new();
        entries.insert(
            "Rocks".to_string(),
            vec![ContentMapping::new("bin/game.js", "QmRocks")],
        );
        Ok(EmptyTileCatalog::new(entries))
    }
}

#[tokio::test]
async fn failed_synthesis_is_forgotten_and_retried() {
    let resolver = TileResolver::new(
        LifecycleConfig::default(),
        Arc::new(FakeContentService::new(Vec::new())),
        Arc::new(FlakyCatalog {
            failures_left: AtomicU32::new(1),
        }),
    );
    let empty_id = EmptyTileSynthesizer::empty_scene_id(&Tile::new("7,7"));

    let failed = resolver.resolve_land_data(&empty_id).await;
    assert!(matches!(failed, Err(ResolveError::UpstreamFetch(_))));
    assert_eq!(resolver.cached_scene_count(), 0);

    let land = resolver.resolve_land_data(&empty_id).await.unwrap();
    assert_eq!(land.mappings_response.contents[0].hash, "QmRocks");
    assert_eq!(resolver.cached_scene_count(), 1);
}
