use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, warn};

use super::naming;
use crate::assets::Asset;
use crate::conversation::model::{ConversationRecord, LoadedConversation};
use crate::conversation::linearize;
use crate::error::Error;
use crate::media::MediaIndex;
use crate::platform;
use crate::resolver::{ConversationResolution, ResolverStats};

/// One fully resolved conversation, ready to be written.
pub struct WriteItem {
    pub conversation: LoadedConversation,
    pub resolution: ConversationResolution,
    pub assets: Vec<Asset>,
}

#[derive(Debug, Default)]
pub struct WriteReport {
    pub folders_created: usize,
    pub media_copied: usize,
    pub with_media: usize,
    pub with_assets: usize,
}

/// Per-conversation descriptor in the master index.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationDescriptor {
    pub id: String,
    pub title: String,
    pub date: String,
    pub message_count: usize,
    pub has_media: bool,
    pub has_assets: bool,
    pub folder: String,
}

#[derive(Debug, Serialize)]
struct MasterIndex<'a> {
    conversation_count: usize,
    organization_mode: &'static str,
    conversations: &'a [ConversationDescriptor],
    resolver: &'a ResolverStats,
}

/// The output directory must be empty or absent when a fresh run starts.
/// The extraction workdir (`_tmp`) is created afterwards, inside it.
pub fn check_output_slot(out_dir: &Path) -> Result<(), Error> {
    if !out_dir.exists() {
        return Ok(());
    }
    if !out_dir.is_dir() {
        return Err(Error::OutputConflict(out_dir.to_path_buf()));
    }
    if fs::read_dir(out_dir)?.next().is_some() {
        return Err(Error::OutputConflict(out_dir.to_path_buf()));
    }
    Ok(())
}

/// Remove previous output (everything except the `_tmp` workdir), so
/// `rematch-media` can rewrite in place.
pub fn clean_previous_output(out_dir: &Path) -> Result<(), Error> {
    for entry in fs::read_dir(out_dir)? {
        let path = entry?.path();
        if path.file_name().and_then(|n| n.to_str()) == Some("_tmp") {
            continue;
        }
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Write every surviving conversation. The worklist arrives sorted by
/// conversation-id; ordinals come from that order, so the emitted tree is
/// identical across runs and worker counts.
pub fn write_output(
    items: &[WriteItem],
    index: &MediaIndex,
    stats: &ResolverStats,
    out_dir: &Path,
    flat: bool,
    cancel: &AtomicBool,
    on_progress: impl Fn(usize, usize) + Sync,
) -> Result<WriteReport, Error> {
    fs::create_dir_all(out_dir)?;

    let done = AtomicUsize::new(0);
    let results: Vec<(ConversationDescriptor, usize)> = items
        .par_iter()
        .enumerate()
        .map(|(position, item)| {
            if cancel.load(Ordering::Relaxed) {
                return Err(Error::Cancelled);
            }
            let written = if flat {
                write_flat_conversation(item, index, out_dir, position + 1)?
            } else {
                write_conversation_folder(item, index, out_dir, position + 1)?
            };
            on_progress(done.fetch_add(1, Ordering::Relaxed) + 1, items.len());
            Ok(written)
        })
        .collect::<Result<_, Error>>()?;

    let mut report = WriteReport::default();
    let mut descriptors = Vec::with_capacity(results.len());
    for (descriptor, media_copied) in results {
        report.folders_created += 1;
        report.media_copied += media_copied;
        if descriptor.has_media {
            report.with_media += 1;
        }
        if descriptor.has_assets {
            report.with_assets += 1;
        }
        descriptors.push(descriptor);
    }

    if !flat {
        create_link_dirs(out_dir, &descriptors)?;
    }

    let master = MasterIndex {
        conversation_count: descriptors.len(),
        organization_mode: if flat { "flat" } else { "by_conversation" },
        conversations: &descriptors,
        resolver: stats,
    };
    let index_path = out_dir.join("index.json");
    fs::write(&index_path, serde_json::to_vec_pretty(&master)?)?;
    debug!("Master index written: {}", index_path.display());

    Ok(report)
}

/// `{date}_{slug}_{00001}/` with conversation.json, media/, assets/,
/// media_manifest.json.
fn write_conversation_folder(
    item: &WriteItem,
    index: &MediaIndex,
    out_dir: &Path,
    ordinal: usize,
) -> Result<(ConversationDescriptor, usize), Error> {
    let conv = &item.conversation;
    let title = conv.raw.title.clone().unwrap_or_else(|| "untitled".to_string());
    let folder = naming::folder_name(conv.raw.create_time, &title, ordinal);
    let conv_dir = out_dir.join(&folder);
    let media_dir = conv_dir.join("media");
    fs::create_dir_all(&media_dir)?;

    // Copy resolved media, renamed to {hash8}_{basename}. Tokens from the
    // resolver are remapped to the final on-disk names for the manifest.
    let mut disk_names: BTreeMap<usize, String> = BTreeMap::new();
    let mut media_copied = 0usize;
    for &file_idx in &item.resolution.media {
        let file = index.file(file_idx);
        if !file.path.is_file() {
            warn!("Resolved media vanished before copy: {}", file.path.display());
            continue;
        }
        let digest = naming::file_digest(&file.path)?;
        let name = naming::copy_name(file, &digest);
        fs::copy(&file.path, media_dir.join(&name))?;
        disk_names.insert(file_idx, name);
        media_copied += 1;
    }

    let mut manifest: BTreeMap<String, String> = BTreeMap::new();
    for (token, file_idx) in &item.resolution.manifest {
        if let Some(name) = disk_names.get(file_idx) {
            manifest.insert(token.clone(), name.clone());
        }
    }
    if !manifest.is_empty() {
        fs::write(
            conv_dir.join("media_manifest.json"),
            serde_json::to_vec_pretty(&manifest)?,
        )?;
    }

    let mut asset_names = Vec::new();
    if !item.assets.is_empty() {
        let assets_dir = conv_dir.join("assets");
        fs::create_dir_all(&assets_dir)?;
        for asset in &item.assets {
            let name = asset.filename();
            fs::write(assets_dir.join(&name), asset.body.as_bytes())?;
            asset_names.push(name);
        }
    }

    // Media ordering in the record follows post-copy names.
    let mut media_names: Vec<String> = disk_names.values().cloned().collect();
    media_names.sort();

    let record = ConversationRecord {
        conversation_id: conv.id.clone(),
        title: title.clone(),
        create_time: conv.raw.create_time,
        update_time: conv.raw.update_time,
        messages: linearize::linearize(&conv.raw),
        mapping: conv.mapping_value.clone(),
        media: media_names.clone(),
        unresolved: item.resolution.unresolved.clone(),
        assets: asset_names.clone(),
    };
    let message_count = record.messages.len();
    fs::write(
        conv_dir.join("conversation.json"),
        serde_json::to_vec_pretty(&record)?,
    )?;

    Ok((
        ConversationDescriptor {
            id: conv.id.clone(),
            title,
            date: naming::date_string(conv.raw.create_time),
            message_count,
            has_media: !media_names.is_empty(),
            has_assets: !asset_names.is_empty(),
            folder,
        },
        media_copied,
    ))
}

/// Legacy flat layout: conversations/conv_{00001}.json plus one shared
/// media/ pool. Copies stay hash-prefixed so basenames cannot collide.
fn write_flat_conversation(
    item: &WriteItem,
    index: &MediaIndex,
    out_dir: &Path,
    ordinal: usize,
) -> Result<(ConversationDescriptor, usize), Error> {
    let conv = &item.conversation;
    let title = conv.raw.title.clone().unwrap_or_else(|| "untitled".to_string());
    let conv_dir = out_dir.join("conversations");
    let media_dir = out_dir.join("media");
    fs::create_dir_all(&conv_dir)?;
    fs::create_dir_all(&media_dir)?;

    let mut media_names = Vec::new();
    let mut media_copied = 0usize;
    for &file_idx in &item.resolution.media {
        let file = index.file(file_idx);
        if !file.path.is_file() {
            continue;
        }
        let digest = naming::file_digest(&file.path)?;
        let name = naming::copy_name(file, &digest);
        let target = media_dir.join(&name);
        if !target.exists() {
            fs::copy(&file.path, target)?;
            media_copied += 1;
        }
        media_names.push(name);
    }
    media_names.sort();
    media_names.dedup();

    let record = ConversationRecord {
        conversation_id: conv.id.clone(),
        title: title.clone(),
        create_time: conv.raw.create_time,
        update_time: conv.raw.update_time,
        messages: linearize::linearize(&conv.raw),
        mapping: conv.mapping_value.clone(),
        media: media_names.clone(),
        unresolved: item.resolution.unresolved.clone(),
        assets: Vec::new(),
    };
    let message_count = record.messages.len();
    let file_name = format!("conv_{:05}.json", ordinal);
    fs::write(conv_dir.join(&file_name), serde_json::to_vec_pretty(&record)?)?;

    Ok((
        ConversationDescriptor {
            id: conv.id.clone(),
            title,
            date: naming::date_string(conv.raw.create_time),
            message_count,
            has_media: !media_names.is_empty(),
            has_assets: false,
            folder: format!("conversations/{}", file_name),
        },
        media_copied,
    ))
}

/// `_with_media/` and `_with_assets/`: relative links into conversations
/// that carry the respective payload.
fn create_link_dirs(out_dir: &Path, descriptors: &[ConversationDescriptor]) -> Result<(), Error> {
    let media_links = out_dir.join("_with_media");
    let assets_links = out_dir.join("_with_assets");
    fs::create_dir_all(&media_links)?;
    fs::create_dir_all(&assets_links)?;

    for descriptor in descriptors {
        let target = Path::new("..").join(&descriptor.folder);
        if descriptor.has_media {
            let link = media_links.join(&descriptor.folder);
            if let Err(err) = platform::symlink_dir(&target, &link) {
                warn!("Could not link {}: {}", link.display(), err);
            }
        }
        if descriptor.has_assets {
            let link = assets_links.join(&descriptor.folder);
            if let Err(err) = platform::symlink_dir(&target, &link) {
                warn!("Could not link {}: {}", link.display(), err);
            }
        }
    }
    Ok(())
}
