use lavender_core::{collect_garbage, validate_cluster, ValidateOptions};

use crate::{
    publish::{docroots, lock},
    DocrootArgs,
};

pub fn gc(args: DocrootArgs, dry_run: bool) -> anyhow::Result<()> {
    let _lock = lock()?;
    for docroot in docroots(&args.docroots, args.index_dir.as_ref()) {
        let report = collect_garbage(&docroot, dry_run)?;
        for file in &report.files {
            println!("{}", file.display());
        }
        for directory in &report.directories {
            println!("{}/", directory.display());
        }
        println!(
            "{docroot}: {} files, {} directories {}; {} files kept",
            report.files.len(),
            report.directories.len(),
            if dry_run { "deletable" } else { "deleted" },
            report.kept
        );
    }
    Ok(())
}

pub fn validate(args: DocrootArgs, md5: bool, fix: bool) -> anyhow::Result<()> {
    let _lock = lock()?;
    let docroots = docroots(&args.docroots, args.index_dir.as_ref());
    let report = validate_cluster(&docroots, ValidateOptions { md5, fix })?;
    for file in &report.fixed {
        println!("fixed {}", file.display());
    }
    if report.is_ok() {
        println!("ok");
        return Ok(());
    }
    for problem in &report.problems {
        println!("{problem}");
    }
    anyhow::bail!("{} problem(s) found", report.problems.len())
}
