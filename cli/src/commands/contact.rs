use anyhow::{Result, bail};

use phinpt_core::auth::{AuthGate, FileSlot};
use phinpt_core::models::{ContactInfo, ContactInfoInput};
use phinpt_core::service::TrainerService;

use super::helpers::print_json;

fn print_contact(info: &ContactInfo) {
    println!("Phone:    {}", info.phone);
    println!("Email:    {}", info.email);
    println!("Facebook: {}", info.facebook);
    println!("Zalo:     {}", info.zalo);
    if let Some(ref at) = info.updated_at {
        println!("Updated:  {at}");
    }
}

pub(crate) fn cmd_contact_show(service: &mut TrainerService, json: bool) -> Result<()> {
    service.fetch_contact_info()?;
    let info = &service.state().contact_info;
    if json {
        print_json(info)?;
    } else {
        print_contact(info);
    }
    Ok(())
}

/// Fields left as `None` keep their current value.
#[derive(Debug, Default)]
pub(crate) struct ContactChanges {
    pub phone: Option<String>,
    pub email: Option<String>,
    pub facebook: Option<String>,
    pub zalo: Option<String>,
}

impl ContactChanges {
    fn is_empty(&self) -> bool {
        self.phone.is_none() && self.email.is_none() && self.facebook.is_none() && self.zalo.is_none()
    }

    fn apply(self, current: &ContactInfo) -> ContactInfoInput {
        let mut input = ContactInfoInput::from(current);
        if let Some(phone) = self.phone {
            input.phone = phone;
        }
        if let Some(email) = self.email {
            input.email = email;
        }
        if let Some(facebook) = self.facebook {
            input.facebook = facebook;
        }
        if let Some(zalo) = self.zalo {
            input.zalo = zalo;
        }
        input
    }
}

pub(crate) fn cmd_contact_set(
    service: &mut TrainerService,
    gate: &AuthGate<FileSlot>,
    changes: ContactChanges,
    json: bool,
) -> Result<()> {
    gate.require_admin()?;
    if changes.is_empty() {
        bail!("Nothing to update. Provide at least one of --phone, --email, --facebook or --zalo");
    }

    let current = service.db().get_contact_info()?;
    let saved = service.update_contact_info(&changes.apply(&current))?;

    if json {
        print_json(&saved)?;
    } else {
        println!("Contact info saved.\n");
        print_contact(&saved);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_keeps_untouched_fields() {
        let current = ContactInfo::default();
        let input = ContactChanges {
            phone: Some("0987654321".to_string()),
            ..Default::default()
        }
        .apply(&current);

        assert_eq!(input.phone, "0987654321");
        assert_eq!(input.email, current.email);
        assert_eq!(input.facebook, current.facebook);
        assert_eq!(input.zalo, current.zalo);
    }

    #[test]
    fn test_is_empty() {
        assert!(ContactChanges::default().is_empty());
        assert!(
            !ContactChanges {
                zalo: Some("https://zalo.me/1".to_string()),
                ..Default::default()
            }
            .is_empty()
        );
    }
}
