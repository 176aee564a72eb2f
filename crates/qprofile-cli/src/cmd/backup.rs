use crate::output::{print_changes, print_json};
use anyhow::Context;
use qprofile_core::QualityProfileKey;
use std::path::Path;

pub fn backup(
    root: &Path,
    user: Option<&str>,
    profile: &QualityProfileKey,
    output: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let project = super::open(root, user)?;
    let ctx = project.ctx();

    match output {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            project
                .service
                .backup(&ctx, profile, std::io::BufWriter::new(file))
                .with_context(|| format!("failed to back up '{profile}'"))?;
            eprintln!("Wrote backup of {profile} to {}", path.display());
        }
        None if json => {
            let document = project
                .service
                .backup_document(&ctx, profile)
                .with_context(|| format!("failed to back up '{profile}'"))?;
            print_json(&document)?;
        }
        None => project
            .service
            .backup(&ctx, profile, std::io::stdout().lock())
            .with_context(|| format!("failed to back up '{profile}'"))?,
    }
    Ok(())
}

pub fn restore(
    root: &Path,
    user: Option<&str>,
    profile: &QualityProfileKey,
    file: &Path,
    json: bool,
) -> anyhow::Result<()> {
    let project = super::open(root, user)?;
    let ctx = project.ctx();

    let changes = if file == Path::new("-") {
        project.service.restore(&ctx, std::io::stdin().lock(), profile)
    } else {
        let reader = std::fs::File::open(file)
            .with_context(|| format!("failed to open {}", file.display()))?;
        project
            .service
            .restore(&ctx, std::io::BufReader::new(reader), profile)
    }
    .with_context(|| format!("failed to restore '{profile}'"))?;

    if json {
        print_json(&changes)?;
    } else {
        print_changes(&changes);
    }
    Ok(())
}
