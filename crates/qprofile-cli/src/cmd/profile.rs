use crate::output::{print_changes, print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use qprofile_core::QualityProfileKey;
use std::path::Path;

#[derive(Subcommand)]
pub enum ProfileSubcommand {
    /// Create a profile, optionally inheriting from a parent
    Create {
        #[arg(value_parser = super::parse_profile)]
        profile: QualityProfileKey,
        /// Parent profile as <language>:<name>
        #[arg(long, value_parser = super::parse_profile)]
        parent: Option<QualityProfileKey>,
    },
    /// List all profiles
    List,
    /// Change or clear the parent of a profile
    SetParent {
        #[arg(value_parser = super::parse_profile)]
        profile: QualityProfileKey,
        /// New parent; omit to detach the profile
        #[arg(long, value_parser = super::parse_profile)]
        parent: Option<QualityProfileKey>,
    },
}

pub fn run(
    root: &Path,
    user: Option<&str>,
    subcmd: ProfileSubcommand,
    json: bool,
) -> anyhow::Result<()> {
    match subcmd {
        ProfileSubcommand::Create { profile, parent } => create(root, user, profile, parent, json),
        ProfileSubcommand::List => list(root, user, json),
        ProfileSubcommand::SetParent { profile, parent } => {
            set_parent(root, user, profile, parent, json)
        }
    }
}

fn create(
    root: &Path,
    user: Option<&str>,
    profile: QualityProfileKey,
    parent: Option<QualityProfileKey>,
    json: bool,
) -> anyhow::Result<()> {
    let project = super::open(root, user)?;
    let changes = project
        .service
        .create_profile(&project.ctx(), &profile, parent)
        .with_context(|| format!("failed to create profile '{profile}'"))?;

    if json {
        print_json(&serde_json::json!({ "profile": profile, "changes": changes }))?;
    } else {
        println!("Created profile: {profile}");
        if !changes.is_empty() {
            print_changes(&changes);
        }
    }
    Ok(())
}

fn list(root: &Path, user: Option<&str>, json: bool) -> anyhow::Result<()> {
    let project = super::open(root, user)?;
    let profiles = project.service.list_profiles(&project.ctx());

    if json {
        return print_json(&profiles);
    }
    if profiles.is_empty() {
        println!("No profiles.");
        return Ok(());
    }
    let rows = profiles
        .iter()
        .map(|p| {
            vec![
                p.key.language.clone(),
                p.key.name.clone(),
                p.parent
                    .as_ref()
                    .map(|k| k.name.clone())
                    .unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();
    print_table(&["LANGUAGE", "NAME", "PARENT"], rows);
    Ok(())
}

fn set_parent(
    root: &Path,
    user: Option<&str>,
    profile: QualityProfileKey,
    parent: Option<QualityProfileKey>,
    json: bool,
) -> anyhow::Result<()> {
    let project = super::open(root, user)?;
    let changes = project
        .service
        .set_parent(&project.ctx(), &profile, parent)
        .with_context(|| format!("failed to set parent of '{profile}'"))?;

    if json {
        print_json(&changes)?;
    } else {
        print_changes(&changes);
    }
    Ok(())
}

pub fn resync(
    root: &Path,
    user: Option<&str>,
    profile: &QualityProfileKey,
    json: bool,
) -> anyhow::Result<()> {
    let project = super::open(root, user)?;
    let count = project
        .service
        .resync_index(&project.ctx(), profile)
        .with_context(|| format!("failed to resync '{profile}'"))?;

    if json {
        print_json(&serde_json::json!({ "profile": profile, "indexed": count }))?;
    } else {
        println!("Indexed {count} active rule(s) of {profile}");
    }
    Ok(())
}
