use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use vitrine_archive::{
    Annotation, ArchiveBuilder, ArchiveReader, AssetMetadata, BuilderState, CancellationToken,
    Compatibility, CompressionHint, ConformanceLevel, ContainerVariant, ContainerWriter, Error,
    IntegrityMismatchWarning, MANIFEST_NAME, PackOptions, Progress, ReaderOptions, ReaderState,
    Transform, Vec3,
};

const MESH: &[u8; 12] = b"hello world!";
const MESH_SHA256: &str = "7509e5bda0c762d2bac7f90d758b5b2263fa01ccbc542ab5e3df163be08e6ca9";
const MESH_AGGREGATE: &str = "1ebd697eb955affab0738ceb75ed33a9bd5a9c44358e96c7bb6e3afd62f6a404";

fn test_builder() -> ArchiveBuilder {
    let mut builder = ArchiveBuilder::new("vitrine-test");
    builder.set_project_title("Test");
    builder
        .add_asset("mesh", MESH.to_vec(), Transform::default(), AssetMetadata::default())
        .expect("add mesh");
    builder
}

async fn pack(builder: &mut ArchiveBuilder) -> Vec<u8> {
    builder
        .pack(&CancellationToken::new())
        .await
        .expect("pack archive")
        .bytes
}

/// A container written entry by entry, bypassing the builder.
fn raw_container(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ContainerWriter::new(ContainerVariant::Compressed);
    for (name, bytes) in entries {
        writer
            .add_entry(name, bytes.to_vec(), CompressionHint::Auto)
            .expect("add entry");
    }
    writer
        .finalize(None, &CancellationToken::new())
        .expect("finalize")
}

fn manifest_json(file_name: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "format_version": "1.0",
        "producer": "vitrine-test",
        "project": { "title": "Test" },
        "data_entries": { "mesh_0": { "file_name": file_name } }
    }))
    .unwrap()
}

#[tokio::test]
async fn packed_manifest_records_known_digests() {
    let mut builder = test_builder();
    let packed = builder.pack(&CancellationToken::new()).await.unwrap();
    assert_eq!(builder.state(), BuilderState::Packed);

    let manifest = &packed.manifest;
    assert_eq!(manifest.data_entries["mesh_0"].file_name, "assets/mesh_0.glb");
    let integrity = manifest.integrity.as_ref().unwrap();
    assert_eq!(integrity.algorithm, "SHA-256");
    assert_eq!(integrity.assets["assets/mesh_0.glb"], MESH_SHA256);
    assert_eq!(integrity.manifest_hash, MESH_AGGREGATE);

    let reader = ArchiveReader::open(packed.bytes, &ReaderOptions::default()).unwrap();
    assert_eq!(reader.manifest(), manifest);
}

#[tokio::test]
async fn pack_then_open_round_trip() {
    let mut builder = test_builder();
    builder
        .add_asset(
            "thumbnail",
            b"jpeg bytes".to_vec(),
            Transform::default(),
            AssetMetadata::default(),
        )
        .unwrap();
    builder
        .add_annotation(
            Annotation::new("a1", "Chisel mark", Vec3::new(0.1, 0.2, 0.3)).with_body("Left side"),
        )
        .unwrap();
    let bytes = pack(&mut builder).await;

    let mut reader = ArchiveReader::open(bytes, &ReaderOptions::default()).unwrap();
    assert_eq!(reader.state(), ReaderState::ManifestParsed);
    assert_eq!(reader.compatibility(), &Compatibility::Current);
    assert_eq!(reader.entries()[0].name, MANIFEST_NAME);

    assert_eq!(reader.extract_asset("mesh_0").await.unwrap(), MESH);
    assert_eq!(reader.state(), ReaderState::AssetsAccessible);
    assert_eq!(reader.thumbnail().await.unwrap().as_deref(), Some(&b"jpeg bytes"[..]));
    assert_eq!(reader.manifest().annotation("a1").unwrap().title, "Chisel mark");
    assert!(reader.missing_assets().is_empty());

    let report = reader.verify(&CancellationToken::new()).await.unwrap();
    assert!(report.is_clean(), "{:?}", report.warnings);
    assert_eq!(report.verified.len(), 2);
}

#[test]
fn open_without_manifest_fails() {
    let bytes = raw_container(&[("assets/mesh_0.glb", MESH)]);
    assert!(matches!(
        ArchiveReader::open(bytes, &ReaderOptions::default()),
        Err(Error::ManifestMissing)
    ));
}

#[test]
fn nested_manifest_is_not_the_root_manifest() {
    let manifest = manifest_json("assets/mesh_0.glb");
    let bytes = raw_container(&[("sub/manifest.json", &manifest), ("assets/mesh_0.glb", MESH)]);
    assert!(matches!(
        ArchiveReader::open(bytes, &ReaderOptions::default()),
        Err(Error::ManifestMissing)
    ));
}

#[tokio::test]
async fn traversal_in_manifest_fails_only_on_extract() {
    let manifest = manifest_json("assets/../../evil.sh");
    let bytes = raw_container(&[(MANIFEST_NAME, &manifest)]);

    let mut reader = ArchiveReader::open(bytes, &ReaderOptions::default()).unwrap();
    assert_eq!(reader.manifest().data_entries["mesh_0"].file_name, "assets/../../evil.sh");
    assert!(matches!(
        reader.extract_asset("mesh_0").await,
        Err(Error::FilenameSecurity(_))
    ));
    assert_eq!(reader.missing_assets(), vec!["mesh_0".to_string()]);
}

#[tokio::test]
async fn mutation_after_hashing_never_packs_stale_digests() {
    let mut builder = test_builder();
    builder.compute_hashes(&CancellationToken::new()).await.unwrap();
    assert_eq!(builder.state(), BuilderState::Hashed);
    assert!(builder.manifest().integrity.is_some());

    builder
        .add_asset("mesh", b"second mesh".to_vec(), Transform::default(), AssetMetadata::default())
        .unwrap();
    assert_eq!(builder.state(), BuilderState::Accumulating);
    assert!(builder.manifest().integrity.is_none());

    let packed = builder.pack(&CancellationToken::new()).await.unwrap();
    let integrity = packed.manifest.integrity.as_ref().unwrap();
    assert_eq!(integrity.assets.len(), 2);

    let reader = ArchiveReader::open(packed.bytes, &ReaderOptions::default()).unwrap();
    assert!(reader.verify(&CancellationToken::new()).await.unwrap().is_clean());
}

#[tokio::test]
async fn tampered_asset_is_reported_not_fatal() {
    let mut builder = test_builder();
    builder
        .add_asset("scene", b"scene bytes".to_vec(), Transform::default(), AssetMetadata::default())
        .unwrap();
    let packed = builder.pack(&CancellationToken::new()).await.unwrap();

    let manifest = packed.manifest.to_vec().unwrap();
    let mut tampered_mesh = MESH.to_vec();
    tampered_mesh[0] ^= 0x01;
    let bytes = raw_container(&[
        (MANIFEST_NAME, &manifest),
        ("assets/mesh_0.glb", &tampered_mesh),
        ("assets/scene_0.ply", b"scene bytes"),
    ]);

    let mut reader = ArchiveReader::open(bytes, &ReaderOptions::default()).unwrap();
    let report = reader.verify(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.mismatched_paths(), vec!["assets/mesh_0.glb"]);
    assert!(report.manifest_hash_mismatch());
    assert_eq!(report.verified, vec!["assets/scene_0.ply".to_string()]);
    assert!(matches!(
        &report.warnings[0],
        IntegrityMismatchWarning::AssetDigest { expected, .. } if expected == MESH_SHA256
    ));
    assert_eq!(reader.extract_asset("mesh_0").await.unwrap(), tampered_mesh);
}

#[tokio::test]
async fn thumbnail_alone_does_not_validate() {
    let mut builder = ArchiveBuilder::new("vitrine-test");
    builder.set_project_title("Test");
    builder
        .add_asset("thumbnail", b"jpeg".to_vec(), Transform::default(), AssetMetadata::default())
        .unwrap();

    let err = builder.pack(&CancellationToken::new()).await.unwrap_err();
    let Error::ManifestValidation { report } = err else {
        panic!("expected validation failure, got {err:?}");
    };
    assert_eq!(report.missing_required[0].field, "data_entries");
    assert_eq!(builder.state(), BuilderState::Accumulating);
}

#[test]
fn manifest_missing_minimal_fields_fails_open() {
    let manifest = serde_json::to_vec(&json!({
        "format_version": "1.0",
        "producer": "vitrine-test",
        "data_entries": { "mesh_0": { "file_name": "assets/mesh_0.glb" } }
    }))
    .unwrap();
    let bytes = raw_container(&[(MANIFEST_NAME, &manifest), ("assets/mesh_0.glb", MESH)]);
    assert!(matches!(
        ArchiveReader::open(bytes, &ReaderOptions::default()),
        Err(Error::ManifestValidation { .. })
    ));
}

#[test]
fn malformed_manifest_fails_open() {
    let bytes = raw_container(&[(MANIFEST_NAME, b"{ \"format_version\": ")]);
    assert!(matches!(
        ArchiveReader::open(bytes, &ReaderOptions::default()),
        Err(Error::ManifestParse(_))
    ));
}

#[test]
fn non_container_bytes_fail_open() {
    assert!(matches!(
        ArchiveReader::open(b"ply\nformat ascii 1.0\n".to_vec(), &ReaderOptions::default()),
        Err(Error::ContainerFormat { .. })
    ));
}

#[tokio::test]
async fn foreign_major_version_is_read_best_effort() {
    let manifest = serde_json::to_vec(&json!({
        "format_version": "2.0",
        "data_entries": { "mesh_0": { "file_name": "assets/mesh_0.glb" } }
    }))
    .unwrap();
    let bytes = raw_container(&[(MANIFEST_NAME, &manifest), ("assets/mesh_0.glb", MESH)]);

    let mut reader = ArchiveReader::open(bytes.clone(), &ReaderOptions::default()).unwrap();
    assert!(matches!(reader.compatibility(), Compatibility::ForeignMajor(_)));
    assert!(reader.validation().is_valid());
    assert_eq!(reader.extract_asset("mesh_0").await.unwrap(), MESH);

    let strict = ReaderOptions::default().refuse_foreign_major(true);
    assert!(matches!(
        ArchiveReader::open(bytes, &strict),
        Err(Error::UnsupportedVersion(Compatibility::ForeignMajor(_)))
    ));
}

#[test]
fn newer_minor_version_opens() {
    let mut value: Value = serde_json::from_slice(&manifest_json("assets/mesh_0.glb")).unwrap();
    value["format_version"] = json!("1.4");
    let manifest = serde_json::to_vec(&value).unwrap();
    let bytes = raw_container(&[(MANIFEST_NAME, &manifest), ("assets/mesh_0.glb", MESH)]);

    let reader = ArchiveReader::open(bytes, &ReaderOptions::default()).unwrap();
    assert!(matches!(reader.compatibility(), Compatibility::NewerMinor(_)));
}

#[tokio::test]
async fn unknown_fields_survive_open_and_repack() {
    let mut value: Value = serde_json::from_slice(&manifest_json("assets/mesh_0.glb")).unwrap();
    value["viewer_settings"] = json!({ "background": "#101010", "orbit": { "damping": 0.25 } });
    value["project"]["catalogue_code"] = json!("X-17");
    value["data_entries"]["mesh_0"]["lod"] = json!([0, 1, 2]);
    let manifest = serde_json::to_vec(&value).unwrap();
    let bytes = raw_container(&[(MANIFEST_NAME, &manifest), ("assets/mesh_0.glb", MESH)]);

    let reader = ArchiveReader::open(bytes, &ReaderOptions::default()).unwrap();
    let mut builder = reader.into_builder().unwrap();
    builder.set_provenance(Default::default());
    let packed = builder.pack(&CancellationToken::new()).await.unwrap();

    let reopened = ArchiveReader::open(packed.bytes, &ReaderOptions::default()).unwrap();
    let out: Value = serde_json::to_value(reopened.manifest()).unwrap();
    assert_eq!(out["viewer_settings"], value["viewer_settings"]);
    assert_eq!(out["project"]["catalogue_code"], json!("X-17"));
    assert_eq!(out["data_entries"]["mesh_0"]["lod"], json!([0, 1, 2]));
}

#[tokio::test]
async fn documented_level_gaps_are_reported_not_fatal() {
    let bytes = pack(&mut test_builder()).await;
    let options = ReaderOptions::default().conformance(ConformanceLevel::Documented);
    let reader = ArchiveReader::open(bytes, &options).unwrap();
    assert!(!reader.validation().is_valid());
    assert!(reader.validation().passes_minimal());
}

#[tokio::test]
async fn cancelled_pack_reverts_to_accumulating() {
    let mut builder = test_builder();
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert!(matches!(builder.pack(&cancel).await, Err(Error::Cancelled)));
    assert_eq!(builder.state(), BuilderState::Accumulating);
    assert!(builder.manifest().integrity.is_none());

    assert!(builder.pack(&CancellationToken::new()).await.is_ok());
}

#[tokio::test]
async fn pack_reports_progress() {
    let seen = Arc::new(Mutex::new(Vec::<f32>::new()));
    let sink = Arc::clone(&seen);
    let options = PackOptions::default()
        .on_progress(Arc::new(move |p: Progress| sink.lock().unwrap().push(p.percentage())));

    let mut builder = test_builder().with_options(options);
    pack(&mut builder).await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.first(), Some(&0.0));
    assert_eq!(seen.last(), Some(&100.0));
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn stored_variant_without_integrity() {
    let options = PackOptions::default()
        .variant(ContainerVariant::Stored)
        .include_integrity(false);
    let mut builder = test_builder().with_options(options);
    let packed = builder.pack(&CancellationToken::new()).await.unwrap();
    assert_eq!(packed.file_name("bust"), "bust.a3d");
    assert!(packed.manifest.integrity.is_none());

    let reader = ArchiveReader::open(packed.bytes, &ReaderOptions::default()).unwrap();
    assert!(reader.entries().iter().all(|e| e.stored));
    let report = reader.verify(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.warnings, vec![IntegrityMismatchWarning::NoIntegritySection]);
}

#[tokio::test]
async fn open_path_reads_from_disk() {
    let dir = tempfile::Builder::new()
        .prefix("vitrine-test-")
        .tempdir()
        .expect("Failed to create temp dir");
    let packed = test_builder().pack(&CancellationToken::new()).await.unwrap();
    let path = dir.path().join(packed.file_name("test"));
    packed.write_to(&path).await.unwrap();

    let mut reader = ArchiveReader::open_path(&path, &ReaderOptions::default())
        .await
        .unwrap();
    assert_eq!(reader.extract_asset("mesh_0").await.unwrap(), MESH);
}

#[tokio::test]
async fn dispose_is_idempotent() {
    let bytes = pack(&mut test_builder()).await;
    let mut reader = ArchiveReader::open(bytes, &ReaderOptions::default()).unwrap();
    reader.dispose();
    reader.dispose();
    assert_eq!(reader.state(), ReaderState::Disposed);
    assert!(reader.entries().is_empty());
    assert!(matches!(reader.extract_asset("mesh_0").await, Err(Error::Disposed)));
    assert!(matches!(reader.verify(&CancellationToken::new()).await, Err(Error::Disposed)));
    assert_eq!(reader.manifest().project_title(), Some("Test"));
}

#[tokio::test]
async fn missing_asset_key_and_file() {
    let bytes = pack(&mut test_builder()).await;
    let mut reader = ArchiveReader::open(bytes, &ReaderOptions::default()).unwrap();
    assert!(matches!(
        reader.extract_asset("scene_0").await,
        Err(Error::AssetNotFound { name }) if name == "scene_0"
    ));
    assert!(matches!(
        reader.extract_file("assets/nothing.bin").await,
        Err(Error::AssetNotFound { .. })
    ));
}

#[tokio::test]
async fn cancelled_verification_leaves_reader_usable() {
    let bytes = pack(&mut test_builder()).await;
    let mut reader = ArchiveReader::open(bytes, &ReaderOptions::default()).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    assert!(matches!(reader.verify(&cancel).await, Err(Error::Cancelled)));

    assert!(reader.verify(&CancellationToken::new()).await.unwrap().is_clean());
    assert_eq!(reader.extract_asset("mesh_0").await.unwrap(), MESH);
}

#[tokio::test]
async fn undecodable_entry_does_not_hide_the_others() {
    let mut value: Value = serde_json::from_slice(&manifest_json("assets/mesh_0.glb")).unwrap();
    value["data_entries"]["scene_0"] = json!({
        "file_name": "assets/scene_0.ply",
        "transform": { "scale": "big" }
    });
    let manifest = serde_json::to_vec(&value).unwrap();
    let bytes = raw_container(&[
        (MANIFEST_NAME, &manifest),
        ("assets/mesh_0.glb", MESH),
        ("assets/scene_0.ply", b"scene bytes"),
    ]);

    let mut reader = ArchiveReader::open(bytes, &ReaderOptions::default()).unwrap();
    assert!(reader.validation().passes_minimal());
    assert!(reader
        .validation()
        .missing_recommended
        .iter()
        .any(|issue| issue.field == "data_entries.scene_0"));
    assert_eq!(reader.extract_asset("mesh_0").await.unwrap(), MESH);
    assert_eq!(reader.extract_asset("scene_0").await.unwrap(), b"scene bytes");

    let packed = reader
        .into_builder()
        .unwrap()
        .pack(&CancellationToken::new())
        .await
        .unwrap();
    let reopened = ArchiveReader::open(packed.bytes, &ReaderOptions::default()).unwrap();
    let out: Value = serde_json::to_value(reopened.manifest()).unwrap();
    assert_eq!(out["data_entries"]["scene_0"], value["data_entries"]["scene_0"]);
}

#[tokio::test]
async fn null_and_empty_fields_survive_open_and_repack() {
    let mut value: Value = serde_json::from_slice(&manifest_json("assets/mesh_0.glb")).unwrap();
    value["project"]["description"] = Value::Null;
    value["project"]["tags"] = json!([]);
    value["data_entries"]["mesh_0"]["source_notes"] = Value::Null;
    let manifest = serde_json::to_vec(&value).unwrap();
    let bytes = raw_container(&[(MANIFEST_NAME, &manifest), ("assets/mesh_0.glb", MESH)]);

    let reader = ArchiveReader::open(bytes, &ReaderOptions::default()).unwrap();
    let packed = reader
        .into_builder()
        .unwrap()
        .pack(&CancellationToken::new())
        .await
        .unwrap();

    let reopened = ArchiveReader::open(packed.bytes, &ReaderOptions::default()).unwrap();
    let out: Value = serde_json::to_value(reopened.manifest()).unwrap();
    assert_eq!(out["project"], value["project"]);
    assert_eq!(out["data_entries"]["mesh_0"]["source_notes"], Value::Null);
}
