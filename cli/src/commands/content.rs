use anyhow::{Result, bail};

use phinpt_core::auth::{AuthGate, FileSlot};
use phinpt_core::models::{HomeContent, HomeContentInput};
use phinpt_core::service::TrainerService;

use super::helpers::{or_dash, print_json};

fn print_content(content: &HomeContent) {
    println!("Hero title:     {}", content.hero_title);
    println!("Hero subtitle:  {}", content.hero_subtitle);
    println!("Hero image:     {}", or_dash(content.hero_image.as_deref()));
    println!("About:          {}", content.about_text);
    println!("About image:    {}", or_dash(content.about_image.as_deref()));
    println!("Services title: {}", content.services_title);
    for (i, service) in content.services.iter().enumerate() {
        println!("  {}. {service}", i + 1);
    }
}

pub(crate) fn cmd_content_show(service: &mut TrainerService, json: bool) -> Result<()> {
    service.fetch_home_content()?;
    let content = &service.state().home_content;
    if json {
        print_json(content)?;
    } else {
        print_content(content);
    }
    Ok(())
}

/// Text edits to the landing page. An empty image string clears the image.
#[derive(Debug, Default)]
pub(crate) struct ContentChanges {
    pub hero_title: Option<String>,
    pub hero_subtitle: Option<String>,
    pub hero_image: Option<String>,
    pub about_text: Option<String>,
    pub about_image: Option<String>,
    pub services_title: Option<String>,
}

fn image(value: &str) -> Option<String> {
    let value = value.trim().to_string();
    (!value.is_empty()).then_some(value)
}

impl ContentChanges {
    fn is_empty(&self) -> bool {
        self.hero_title.is_none()
            && self.hero_subtitle.is_none()
            && self.hero_image.is_none()
            && self.about_text.is_none()
            && self.about_image.is_none()
            && self.services_title.is_none()
    }

    fn apply(self, current: &HomeContent) -> HomeContentInput {
        let mut input = HomeContentInput::from(current);
        if let Some(v) = self.hero_title {
            input.hero_title = v;
        }
        if let Some(v) = self.hero_subtitle {
            input.hero_subtitle = v;
        }
        if let Some(v) = self.hero_image {
            input.hero_image = image(&v);
        }
        if let Some(v) = self.about_text {
            input.about_text = v;
        }
        if let Some(v) = self.about_image {
            input.about_image = image(&v);
        }
        if let Some(v) = self.services_title {
            input.services_title = v;
        }
        input
    }
}

pub(crate) fn cmd_content_set(
    service: &mut TrainerService,
    gate: &AuthGate<FileSlot>,
    changes: ContentChanges,
    json: bool,
) -> Result<()> {
    gate.require_admin()?;
    if changes.is_empty() {
        bail!("Nothing to update. Provide at least one field to change");
    }

    let current = service.db().get_home_content()?;
    let saved = service.update_home_content(&changes.apply(&current))?;
    if json {
        print_json(&saved)?;
    } else {
        println!("Home content saved.\n");
        print_content(&saved);
    }
    Ok(())
}

pub(crate) fn cmd_content_add_service(
    service: &mut TrainerService,
    gate: &AuthGate<FileSlot>,
    text: &str,
    json: bool,
) -> Result<()> {
    gate.require_admin()?;
    let saved = service.add_service(text)?;
    if json {
        print_json(&saved)?;
    } else {
        println!("Added service #{}: {}", saved.services.len(), text.trim());
    }
    Ok(())
}

/// `number` is the 1-based position shown by `content show`.
pub(crate) fn cmd_content_remove_service(
    service: &mut TrainerService,
    gate: &AuthGate<FileSlot>,
    number: usize,
    json: bool,
) -> Result<()> {
    gate.require_admin()?;
    let Some(index) = number.checked_sub(1) else {
        bail!("Service numbers start at 1");
    };
    let saved = service.remove_service(index)?;
    if json {
        print_json(&saved)?;
    } else {
        println!("Removed service #{number}, {} left", saved.services.len());
    }
    Ok(())
}
