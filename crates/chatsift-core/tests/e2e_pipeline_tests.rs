use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tempfile::tempdir;
use zip::write::FileOptions;
use zip::ZipWriter;

use chatsift_core::engine::RunOptions;
use chatsift_core::{ExportEngine, SilentReporter};

const CONV_1: &str = "11111111-1111-1111-1111-111111111111";
const CONV_2: &str = "22222222-2222-2222-2222-222222222222";
const HASH_A: &str = "000000000000000000000000000000de";

fn write_zip(path: &Path, entries: &[(&str, Vec<u8>)]) {
    let file = File::create(path).unwrap();
    let mut writer = ZipWriter::new(file);
    for (name, data) in entries {
        writer.start_file(*name, FileOptions::default()).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap();
}

fn png_bytes(len: usize) -> Vec<u8> {
    let mut data = b"\x89PNG\r\n\x1a\n".to_vec();
    data.resize(len, 0xAB);
    data
}

fn pdf_bytes(len: usize) -> Vec<u8> {
    let mut data = b"%PDF-1.4\n".to_vec();
    data.resize(len, 0x20);
    data
}

/// A minimal conversation with a single user message carrying the given
/// attachments and content parts.
fn conversation(id: &str, title: &str, attachments: Value, parts: Value) -> Value {
    json!({
        "conversation_id": id,
        "title": title,
        "create_time": 1700000000.0,
        "update_time": 1700000100.0,
        "current_node": "node-1",
        "mapping": {
            "node-0": {"id": "node-0", "children": ["node-1"], "message": {
                "id": "msg-0", "create_time": 1700000000.0,
                "author": {"role": "user"},
                "content": {"content_type": "text", "parts": ["hello"]},
                "metadata": {}
            }},
            "node-1": {"id": "node-1", "parent": "node-0", "children": [], "message": {
                "id": "msg-1", "create_time": 1700000001.0,
                "author": {"role": "assistant"},
                "content": {"content_type": "multimodal_text", "parts": parts},
                "metadata": {"attachments": attachments}
            }}
        }
    })
}

fn run_pipeline(
    entries: &[(&str, Vec<u8>)],
    options: RunOptions,
) -> (tempfile::TempDir, PathBuf, chatsift_core::PipelineResult) {
    let tmp = tempdir().unwrap();
    let archive = tmp.path().join("export.zip");
    write_zip(&archive, entries);

    let out = tmp.path().join("out");
    let engine = ExportEngine::new(chatsift_core::AppConfig::default());
    let result = engine
        .run(&archive, &out, &options, &SilentReporter)
        .unwrap();
    (tmp, out, result)
}

fn conversation_dirs(out: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(out)
        .unwrap()
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.is_dir()
                && !p
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with('_'))
                    .unwrap_or(false)
        })
        .collect();
    dirs.sort();
    dirs
}

fn media_files(conv_dir: &Path) -> Vec<String> {
    let media = conv_dir.join("media");
    if !media.is_dir() {
        return Vec::new();
    }
    let mut names: Vec<String> = fs::read_dir(media)
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn master_index(out: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(out.join("index.json")).unwrap()).unwrap()
}

#[test]
fn test_file_id_attachment_end_to_end() {
    let conv = conversation(
        CONV_1,
        "Attachment chat",
        json!([{"id": "file-ABC", "name": "doc.pdf", "size": 1024}]),
        json!(["see the attached doc"]),
    );
    let (_tmp, out, result) = run_pipeline(
        &[
            (
                "conversations.json",
                serde_json::to_vec(&json!([conv])).unwrap(),
            ),
            ("file-ABC_doc.pdf", pdf_bytes(1024)),
        ],
        RunOptions::default(),
    );

    assert_eq!(result.conversations_emitted, 1);
    assert_eq!(result.stats.resolved_by_strategy.get("file_id"), Some(&1));

    let dirs = conversation_dirs(&out);
    assert_eq!(dirs.len(), 1);
    let media = media_files(&dirs[0]);
    assert_eq!(media.len(), 1);
    assert!(media[0].ends_with("_file-ABC_doc.pdf"));

    // The hash8 prefix is the first 8 hex chars of the copy's own digest.
    let copied = dirs[0].join("media").join(&media[0]);
    let digest = sha256_hex(&fs::read(copied).unwrap());
    assert!(media[0].starts_with(&digest[..8]));

    // Manifest maps the citation tokens to the on-disk name.
    let manifest: Value = serde_json::from_str(
        &fs::read_to_string(dirs[0].join("media_manifest.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(manifest["file-ABC"], json!(media[0]));
    assert_eq!(manifest["doc.pdf"], json!(media[0]));
}

#[test]
fn test_sediment_pointer_end_to_end() {
    let conv = conversation(
        CONV_2,
        "Sediment chat",
        json!([]),
        json!([{
            "asset_pointer": format!("sediment://file_{}", HASH_A),
            "size_bytes": 2000
        }]),
    );
    let media_name = format!("file_{}-33333333-3333-3333-3333-333333333333.png", HASH_A);
    let (_tmp, out, result) = run_pipeline(
        &[
            (
                "conversations.json",
                serde_json::to_vec(&json!([conv])).unwrap(),
            ),
            (media_name.as_str(), png_bytes(2000)),
        ],
        RunOptions::default(),
    );

    assert_eq!(result.stats.resolved_by_strategy.get("file_hash"), Some(&1));
    let dirs = conversation_dirs(&out);
    let media = media_files(&dirs[0]);
    assert_eq!(media.len(), 1);
    assert!(media[0].ends_with(&media_name));
}

#[test]
fn test_conversation_directory_attachment() {
    // One unresolvable file-service citation triggers the directory sweep.
    let conv = conversation(
        CONV_1,
        "Dalle chat",
        json!([]),
        json!([{
            "asset_pointer": "file-service://file-GONE",
            "size_bytes": 99999
        }]),
    );
    let media_path = format!("conversations/{}/img.png", CONV_1);
    let (_tmp, out, result) = run_pipeline(
        &[
            (
                "conversations.json",
                serde_json::to_vec(&json!([conv])).unwrap(),
            ),
            (media_path.as_str(), png_bytes(512)),
        ],
        RunOptions::default(),
    );

    assert_eq!(
        result.stats.resolved_by_strategy.get("conversation_dir"),
        Some(&1)
    );
    let dirs = conversation_dirs(&out);
    let media = media_files(&dirs[0]);
    assert_eq!(media.len(), 1);
    assert!(media[0].ends_with("_img.png"));
}

#[test]
fn test_duplicate_records_produce_one_folder() {
    let conv = conversation(CONV_1, "Dup chat", json!([]), json!(["hi"]));
    let (_tmp, out, result) = run_pipeline(
        &[(
            "conversations.json",
            serde_json::to_vec(&json!([conv.clone(), conv.clone(), conv])).unwrap(),
        )],
        RunOptions::default(),
    );

    assert_eq!(result.conversations_emitted, 1);
    assert_eq!(result.duplicates_dropped, 2);
    assert_eq!(conversation_dirs(&out).len(), 1);

    let index = master_index(&out);
    assert_eq!(index["conversation_count"], json!(1));
}

#[test]
fn test_absent_sediment_target_is_unresolved_not_fatal() {
    let conv = conversation(
        CONV_2,
        "Missing media",
        json!([]),
        json!([{
            "asset_pointer": "sediment://file_ffffffffffffffffffffffffffffffff"
        }]),
    );
    let (_tmp, out, result) = run_pipeline(
        &[(
            "conversations.json",
            serde_json::to_vec(&json!([conv])).unwrap(),
        )],
        RunOptions::default(),
    );

    assert_eq!(result.stats.unresolved_citations, 1);
    let dirs = conversation_dirs(&out);
    assert_eq!(dirs.len(), 1);
    assert!(media_files(&dirs[0]).is_empty());

    let record: Value = serde_json::from_str(
        &fs::read_to_string(dirs[0].join("conversation.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(record["unresolved"].as_array().unwrap().len(), 1);
    assert_eq!(record["unresolved"][0]["kind"], json!("sediment_pointer"));

    let index = master_index(&out);
    assert_eq!(index["conversation_count"], json!(1));
    assert_eq!(index["resolver"]["unresolved_citations"], json!(1));
}

#[test]
fn test_archive_without_media() {
    let conv = conversation(CONV_1, "Plain talk", json!([]), json!(["nothing cited"]));
    let (_tmp, out, result) = run_pipeline(
        &[(
            "conversations.json",
            serde_json::to_vec(&json!([conv])).unwrap(),
        )],
        RunOptions::default(),
    );

    assert_eq!(result.media_indexed, 0);
    assert_eq!(result.with_media, 0);
    let dirs = conversation_dirs(&out);
    assert_eq!(dirs.len(), 1);
    assert!(media_files(&dirs[0]).is_empty());
}

/// Media present but never cited: indexed, yet attached to nothing.
#[test]
fn test_uncited_media_stays_out_of_conversations() {
    let conv = conversation(CONV_1, "Plain talk", json!([]), json!(["nothing cited"]));
    let (_tmp, out, result) = run_pipeline(
        &[
            (
                "conversations.json",
                serde_json::to_vec(&json!([conv])).unwrap(),
            ),
            ("orphan.png", png_bytes(123)),
        ],
        RunOptions::default(),
    );

    assert_eq!(result.media_indexed, 1);
    assert_eq!(result.with_media, 0);
    let dirs = conversation_dirs(&out);
    assert!(media_files(&dirs[0]).is_empty());
}

#[test]
fn test_assets_extracted_to_assets_dir() {
    let conv = conversation(
        CONV_1,
        "Code chat",
        json!([]),
        json!(["here:\n```rust\nfn main() {}\n```\ndone"]),
    );
    let (_tmp, out, result) = run_pipeline(
        &[(
            "conversations.json",
            serde_json::to_vec(&json!([conv])).unwrap(),
        )],
        RunOptions::default(),
    );

    assert_eq!(result.with_assets, 1);
    let dirs = conversation_dirs(&out);
    let assets_dir = dirs[0].join("assets");
    let assets: Vec<String> = fs::read_dir(&assets_dir)
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(assets.len(), 1);
    assert!(assets[0].starts_with("code_block_"));
    assert!(assets[0].ends_with(".rust"));
    assert!(out.join("_with_assets").is_dir());
}

#[test]
fn test_output_conflict_is_fatal_at_start() {
    let tmp = tempdir().unwrap();
    let archive = tmp.path().join("export.zip");
    write_zip(&archive, &[("conversations.json", b"[]".to_vec())]);

    let out = tmp.path().join("out");
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("leftover.txt"), "old run").unwrap();

    let engine = ExportEngine::new(chatsift_core::AppConfig::default());
    let result = engine.run(&archive, &out, &RunOptions::default(), &SilentReporter);
    assert!(matches!(
        result,
        Err(chatsift_core::Error::OutputConflict(_))
    ));
}

#[test]
fn test_workdir_removed_on_success_and_kept_on_request() {
    let conv = conversation(CONV_1, "Chat", json!([]), json!(["x"]));
    let entries = vec![(
        "conversations.json",
        serde_json::to_vec(&json!([conv])).unwrap(),
    )];

    let (_tmp, out, _) = run_pipeline(&entries, RunOptions::default());
    assert!(!out.join("_tmp").exists());

    let (_tmp2, out2, _) = run_pipeline(
        &entries,
        RunOptions {
            keep_workdir: true,
            ..Default::default()
        },
    );
    assert!(out2.join("_tmp").is_dir());
}

#[test]
fn test_rematch_reproduces_output() {
    let conv = conversation(
        CONV_1,
        "Rematch chat",
        json!([{"id": "file-ABC", "name": "doc.pdf", "size": 1024}]),
        json!(["text"]),
    );
    let (_tmp, out, first) = run_pipeline(
        &[
            (
                "conversations.json",
                serde_json::to_vec(&json!([conv])).unwrap(),
            ),
            ("file-ABC_doc.pdf", pdf_bytes(1024)),
        ],
        RunOptions {
            keep_workdir: true,
            ..Default::default()
        },
    );
    let first_dirs = conversation_dirs(&out);
    let first_media = media_files(&first_dirs[0]);

    let engine = ExportEngine::new(chatsift_core::AppConfig::default());
    let second = engine
        .rematch(
            &out,
            &RunOptions {
                keep_workdir: true,
                ..Default::default()
            },
            &SilentReporter,
        )
        .unwrap();

    assert_eq!(second.conversations_emitted, first.conversations_emitted);
    let second_dirs = conversation_dirs(&out);
    assert_eq!(second_dirs, first_dirs);
    assert_eq!(media_files(&second_dirs[0]), first_media);
}

#[test]
fn test_recovery_folder_supplies_missing_media() {
    let tmp = tempdir().unwrap();
    let archive = tmp.path().join("export.zip");
    let conv = conversation(
        CONV_1,
        "Recovered chat",
        json!([{"id": "file-REC", "name": "old.png", "size": 600}]),
        json!(["x"]),
    );
    write_zip(
        &archive,
        &[(
            "conversations.json",
            serde_json::to_vec(&json!([conv])).unwrap(),
        )],
    );

    // The cited file exists only beside the archive, under recovered_files.
    let recovery = tmp.path().join("recovered_files");
    fs::create_dir_all(&recovery).unwrap();
    fs::write(recovery.join("file-REC_old.png"), png_bytes(600)).unwrap();

    let out = tmp.path().join("out");
    let engine = ExportEngine::new(chatsift_core::AppConfig::default());
    let result = engine
        .run(&archive, &out, &RunOptions::default(), &SilentReporter)
        .unwrap();

    assert_eq!(result.stats.resolved_by_strategy.get("file_id"), Some(&1));
    let dirs = conversation_dirs(&out);
    let media = media_files(&dirs[0]);
    assert_eq!(media.len(), 1);
    assert!(media[0].ends_with("_file-REC_old.png"));
}

#[test]
fn test_flat_mode_layout() {
    let conv = conversation(
        CONV_1,
        "Flat chat",
        json!([{"id": "file-ABC", "name": "doc.pdf", "size": 1024}]),
        json!(["x"]),
    );
    let (_tmp, out, _) = run_pipeline(
        &[
            (
                "conversations.json",
                serde_json::to_vec(&json!([conv])).unwrap(),
            ),
            ("file-ABC_doc.pdf", pdf_bytes(1024)),
        ],
        RunOptions {
            flat: true,
            ..Default::default()
        },
    );

    assert!(out.join("conversations/conv_00001.json").is_file());
    let shared: Vec<String> = fs::read_dir(out.join("media"))
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(shared.len(), 1);
    let index = master_index(&out);
    assert_eq!(index["organization_mode"], json!("flat"));
}

/// `.dat` payloads with media magic keep their name in the extraction tree
/// and gain the detected extension only in the output copy.
#[test]
fn test_dat_files_renamed_only_in_copy() {
    let mut wav = b"RIFF\x00\x00\x00\x00WAVEfmt ".to_vec();
    wav.resize(300, 0x11);

    let conv = conversation(
        CONV_1,
        "Voice note",
        json!([{"id": "file-DAT", "name": "audio.dat", "size": 300}]),
        json!(["x"]),
    );
    let (_tmp, out, _) = run_pipeline(
        &[
            (
                "conversations.json",
                serde_json::to_vec(&json!([conv])).unwrap(),
            ),
            ("file-DAT_audio.dat", wav),
        ],
        RunOptions {
            keep_workdir: true,
            ..Default::default()
        },
    );

    let dirs = conversation_dirs(&out);
    let media = media_files(&dirs[0]);
    assert_eq!(media.len(), 1);
    assert!(media[0].ends_with("_file-DAT_audio.wav"));

    // Never renamed in place.
    assert!(out.join("_tmp/file-DAT_audio.dat").is_file());
}

/// Re-running the resolver over an emitted conversation.json and the same
/// extraction yields the media set already attached to the record.
#[test]
fn test_round_trip_resolution_matches_emitted_media() {
    use chatsift_core::conversation::model::LoadedConversation;
    use chatsift_core::media::MediaIndex;
    use chatsift_core::output::naming;
    use chatsift_core::references;
    use chatsift_core::resolver::Resolver;
    use std::collections::BTreeSet;

    let conv = conversation(
        CONV_1,
        "Round trip",
        json!([{"id": "file-ABC", "name": "doc.pdf", "size": 1024}]),
        json!([{
            "asset_pointer": format!("sediment://file_{}", HASH_A),
            "size_bytes": 2000
        }]),
    );
    let sediment_name = format!("file_{}-33333333-3333-3333-3333-333333333333.png", HASH_A);
    let (_tmp, out, _) = run_pipeline(
        &[
            (
                "conversations.json",
                serde_json::to_vec(&json!([conv])).unwrap(),
            ),
            ("file-ABC_doc.pdf", pdf_bytes(1024)),
            (sediment_name.as_str(), png_bytes(2000)),
        ],
        RunOptions {
            keep_workdir: true,
            ..Default::default()
        },
    );

    let dirs = conversation_dirs(&out);
    let record: Value = serde_json::from_str(
        &fs::read_to_string(dirs[0].join("conversation.json")).unwrap(),
    )
    .unwrap();
    let recorded: BTreeSet<String> = record["media"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert_eq!(recorded.len(), 2);

    let loaded = LoadedConversation {
        id: record["conversation_id"].as_str().unwrap().to_string(),
        mapping_value: record["mapping"].clone(),
        raw: serde_json::from_value(record.clone()).unwrap(),
    };

    let index = MediaIndex::build(&out.join("_tmp"), &[], &[]).unwrap();
    let citations = references::extract_citations(&loaded);
    let sets = vec![citations];
    let resolver = Resolver::new(&index, &sets);
    let resolution = resolver.resolve_conversation(&loaded.id, &sets[0]);

    let replayed: BTreeSet<String> = resolution
        .media
        .iter()
        .map(|&i| {
            let file = index.file(i);
            let digest = naming::file_digest(&file.path).unwrap();
            naming::copy_name(file, &digest)
        })
        .collect();

    assert_eq!(replayed, recorded);
}

fn sha256_hex(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    format!("{:x}", Sha256::digest(data))
}
