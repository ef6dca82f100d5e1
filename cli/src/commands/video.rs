use anyhow::Result;
use tabled::{Table, Tabled, settings::Style};

use phinpt_core::auth::{AuthGate, FileSlot};
use phinpt_core::models::{NewVideo, extract_youtube_id};
use phinpt_core::service::TrainerService;

use super::helpers::{or_dash, print_deleted, print_json, truncate};

pub(crate) fn cmd_video_add(
    service: &mut TrainerService,
    gate: &AuthGate<FileSlot>,
    title: &str,
    url_or_id: &str,
    description: Option<String>,
    category: Option<String>,
    json: bool,
) -> Result<()> {
    gate.require_admin()?;
    let youtube_id = extract_youtube_id(url_or_id).unwrap_or_else(|| url_or_id.trim().to_string());

    let created = service.add_video(&NewVideo {
        title: title.to_string(),
        youtube_id,
        description: description.unwrap_or_default(),
        category: category.unwrap_or_default(),
    })?;

    if json {
        print_json(&created)?;
    } else {
        println!(
            "Added video '{}' (https://youtu.be/{}), id {}",
            created.title, created.youtube_id, created.id
        );
    }
    Ok(())
}

pub(crate) fn cmd_video_list(service: &mut TrainerService, category: Option<&str>, json: bool) -> Result<()> {
    service.fetch_videos()?;
    let videos: Vec<_> = service
        .state()
        .videos
        .iter()
        .filter(|v| category.is_none_or(|c| v.category.eq_ignore_ascii_case(c)))
        .collect();

    if json {
        print_json(&videos)?;
    } else if videos.is_empty() {
        eprintln!("No videos found.");
    } else {
        #[derive(Tabled)]
        struct VideoRow {
            #[tabled(rename = "ID")]
            id: String,
            #[tabled(rename = "Title")]
            title: String,
            #[tabled(rename = "Category")]
            category: String,
            #[tabled(rename = "YouTube")]
            youtube_id: String,
            #[tabled(rename = "Description")]
            description: String,
        }

        let rows: Vec<VideoRow> = videos
            .iter()
            .map(|v| VideoRow {
                id: v.id.clone(),
                title: truncate(&v.title, 35),
                category: or_dash(Some(&v.category)),
                youtube_id: v.youtube_id.clone(),
                description: truncate(&v.description, 40),
            })
            .collect();

        println!("{}", Table::new(&rows).with(Style::rounded()));
    }
    Ok(())
}

pub(crate) fn cmd_video_delete(
    service: &mut TrainerService,
    gate: &AuthGate<FileSlot>,
    id: &str,
    json: bool,
) -> Result<()> {
    gate.require_admin()?;
    service.delete_video(id)?;
    print_deleted("video", id, json);
    Ok(())
}
