use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use phinpt_core::auth::{AuthGate, FileSlot};
use phinpt_core::models::NewTestimonial;
use phinpt_core::service::TrainerService;

use super::helpers::{print_deleted, print_json, truncate};

pub(crate) fn stars(rating: i64) -> String {
    let filled = usize::try_from(rating.clamp(0, 5)).unwrap_or(0);
    format!("{}{}", "★".repeat(filled), "☆".repeat(5 - filled))
}

pub(crate) fn cmd_testimonial_add(
    service: &mut TrainerService,
    gate: &AuthGate<FileSlot>,
    testimonial: &NewTestimonial,
    json: bool,
) -> Result<()> {
    gate.require_admin()?;
    let created = service.add_testimonial(testimonial)?;

    if json {
        print_json(&created)?;
    } else {
        println!(
            "Added testimonial from {} {}, id {}",
            created.name,
            stars(created.rating),
            created.id
        );
    }
    Ok(())
}

pub(crate) fn cmd_testimonial_list(service: &mut TrainerService, json: bool) -> Result<()> {
    service.fetch_testimonials()?;
    let testimonials = &service.state().testimonials;

    if json {
        print_json(testimonials)?;
    } else if testimonials.is_empty() {
        eprintln!("No testimonials yet.");
    } else {
        #[derive(Tabled)]
        struct TestimonialRow {
            #[tabled(rename = "ID")]
            id: String,
            #[tabled(rename = "Name")]
            name: String,
            #[tabled(rename = "Rating")]
            rating: String,
            #[tabled(rename = "Content")]
            content: String,
            #[tabled(rename = "Before/After")]
            photos: String,
        }

        let rows: Vec<TestimonialRow> = testimonials
            .iter()
            .map(|t| TestimonialRow {
                id: t.id.clone(),
                name: truncate(&t.name, 20),
                rating: stars(t.rating),
                content: truncate(&t.content, 50),
                photos: if t.before_image.is_some() && t.after_image.is_some() {
                    "yes".to_string()
                } else {
                    "-".to_string()
                },
            })
            .collect();

        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(4..5)).with(Alignment::center()))
            .to_string();
        println!("{table}");
    }
    Ok(())
}

pub(crate) fn cmd_testimonial_delete(
    service: &mut TrainerService,
    gate: &AuthGate<FileSlot>,
    id: &str,
    json: bool,
) -> Result<()> {
    gate.require_admin()?;
    service.delete_testimonial(id)?;
    print_deleted("testimonial", id, json);
    Ok(())
}
