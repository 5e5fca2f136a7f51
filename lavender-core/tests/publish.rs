use std::{
    path::Path,
    time::{Duration, UNIX_EPOCH},
};

use lavender_common::Md5;
use lavender_core::{
    collect_garbage, publish, publish_to, validate, validate_cluster, CoreError, Distributor,
    Docroot, FileModule, JarEntry, JarModule, ModuleConfig, Problem, ResourceData,
    ValidateOptions,
};
use lavender_index::{Index, Label, Md5Cache};

fn source_tree(root: &Path) {
    for (file, content) in [
        ("img/logo.png", "logo"),
        ("img/legacy/logo.png", "logo"),
        ("css/site.css", "body{background:url(/img/logo.png)}"),
        ("js/app.js", "console.log(1)"),
    ] {
        let path = root.join(file);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
}

fn module(source: &Path, cache: &Path) -> FileModule {
    FileModule::new(ModuleConfig::new("web").unwrap(), source)
        .with_md5_cache(Md5Cache::load_or_create(cache.join("web.md5")).unwrap())
}

#[test]
#[tracing_test::traced_test]
fn second_publish_changes_nothing() {
    let source = tempfile::tempdir().expect("temp dir");
    let cache = tempfile::tempdir().expect("temp dir");
    let hosts = [tempfile::tempdir().expect("temp dir"), tempfile::tempdir().expect("temp dir")];
    source_tree(source.path());
    let targets: Vec<_> = hosts.iter().map(|h| Docroot::new(h.path())).collect();

    let (first, index) = publish_to(&mut module(source.path(), cache.path()), targets.clone()).unwrap();
    assert_eq!(first.total, 4);
    // the legacy copy shares its destination with the logo
    assert_eq!(first.changed, 3);
    assert_eq!(first.to_string(), "3/4 files changed");
    assert!(cache.path().join("web.md5").exists());

    let (second, again) = publish_to(&mut module(source.path(), cache.path()), targets.clone()).unwrap();
    assert_eq!(second.changed, 0);
    assert_eq!(second.total, 4);
    assert_eq!(again, index);

    let logo = index.lookup("/img/logo.png").unwrap();
    for target in &targets {
        let file = target.destination(logo.lavendelized_path()).unwrap();
        assert_eq!(std::fs::read_to_string(file).unwrap(), "logo");
        assert!(validate(target, ValidateOptions { md5: true, fix: false }).unwrap().is_ok());
    }
}

#[test]
fn changed_source_is_republished_and_old_content_collected() {
    let source = tempfile::tempdir().expect("temp dir");
    let cache = tempfile::tempdir().expect("temp dir");
    let host = tempfile::tempdir().expect("temp dir");
    source_tree(source.path());
    let targets = vec![Docroot::new(host.path())];

    let (_, before) = publish_to(&mut module(source.path(), cache.path()), targets.clone()).unwrap();
    let app = source.path().join("js/app.js");
    std::fs::write(&app, "console.log(2)").unwrap();
    // distinct modification time even within the same millisecond
    std::fs::File::options()
        .write(true)
        .open(&app)
        .unwrap()
        .set_modified(UNIX_EPOCH + Duration::from_secs(1))
        .unwrap();
    let (report, after) = publish_to(&mut module(source.path(), cache.path()), targets.clone()).unwrap();
    assert_eq!(report.changed, 1);

    let old = before.lookup("/js/app.js").unwrap();
    let new = after.lookup("/js/app.js").unwrap();
    assert_ne!(old.md5(), new.md5());

    let gc = collect_garbage(&targets[0], false).unwrap();
    assert_eq!(gc.files, vec![targets[0].destination(old.lavendelized_path()).unwrap()]);
    assert!(targets[0].destination(new.lavendelized_path()).unwrap().exists());
}

#[test]
fn inconsistent_targets_fail_before_writing() {
    let a = tempfile::tempdir().expect("temp dir");
    let b = tempfile::tempdir().expect("temp dir");
    let (first, second) = (Docroot::new(a.path()), Docroot::new(b.path()));

    let mut only_a = Index::new();
    only_a
        .add(Label::new("/x.png", "x.png", Md5::digest(b"x")))
        .unwrap();
    only_a.save(&first.module_index("web")).unwrap();

    let err = Distributor::open(vec![first.clone(), second.clone()], "web").unwrap_err();
    match err {
        CoreError::Inconsistent { file, .. } => assert_eq!(file, "web.idx"),
        other => panic!("unexpected error {other}"),
    }
    assert!(!second.module_index("web").exists());
    assert!(!first.all_index().exists());

    only_a.save(&second.module_index("web")).unwrap();
    let mut all = Index::new();
    all.add_reference("x.png", Md5::digest(b"x"));
    all.save(&second.all_index()).unwrap();
    assert!(matches!(
        Distributor::open(vec![first, second], "web"),
        Err(CoreError::Inconsistent { .. })
    ));
}

#[test]
fn failed_update_keeps_the_old_content() {
    let host = tempfile::tempdir().expect("temp dir");
    let docroot = Docroot::new(host.path());
    std::fs::write(host.path().join("site.css"), "old complete content").unwrap();

    let mut distributor = Distributor::open(vec![docroot.clone()], "web").unwrap();
    let label = Label::new("/site.css", "site.css", Md5::digest(b"new"));
    // reading a directory fails after the temporary file was created
    let unreadable = ResourceData::File(host.path().to_path_buf());
    assert!(distributor.write(&label, &unreadable).is_err());

    assert_eq!(
        std::fs::read_to_string(host.path().join("site.css")).unwrap(),
        "old complete content"
    );
    let leftovers: Vec<_> = std::fs::read_dir(host.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .filter(|n| n.ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

#[test]
fn in_memory_jar_publishes_literal_paths() {
    let host = tempfile::tempdir().expect("temp dir");
    let docroot = Docroot::new(host.path());
    let config = ModuleConfig::new("flash")
        .unwrap()
        .with_lavendelize(false)
        .with_target_path_prefix("flash");
    let mut jar = JarModule::from_entries(
        config,
        [JarEntry::new("intro.swf", "1-1", &b"swf"[..])],
    );

    let mut distributor = Distributor::open(vec![docroot.clone()], "flash").unwrap();
    let report = publish(&mut jar, &mut distributor).unwrap();
    distributor.close().unwrap();

    assert_eq!((report.changed, report.total), (1, 1));
    assert_eq!(
        std::fs::read(host.path().join("flash/intro.swf")).unwrap(),
        b"swf"
    );
}

#[test]
fn validation_finds_and_fixes_problems() {
    let source = tempfile::tempdir().expect("temp dir");
    let cache = tempfile::tempdir().expect("temp dir");
    let hosts = [tempfile::tempdir().expect("temp dir"), tempfile::tempdir().expect("temp dir")];
    source_tree(source.path());
    let targets: Vec<_> = hosts.iter().map(|h| Docroot::new(h.path())).collect();
    let (_, index) = publish_to(&mut module(source.path(), cache.path()), targets.clone()).unwrap();
    assert!(validate_cluster(&targets, ValidateOptions::default()).unwrap().is_ok());

    let css = index.lookup("/css/site.css").unwrap();
    let js = index.lookup("/js/app.js").unwrap();
    std::fs::write(targets[0].destination(css.lavendelized_path()).unwrap(), "tampered").unwrap();
    std::fs::remove_file(targets[0].destination(js.lavendelized_path()).unwrap()).unwrap();
    std::fs::remove_file(targets[1].all_index()).unwrap();

    let report = validate_cluster(&targets, ValidateOptions { md5: true, fix: false }).unwrap();
    assert!(!report.is_ok());
    assert!(report.problems.iter().any(|p| matches!(p, Problem::Md5Mismatch { .. })));
    assert!(report.problems.iter().any(|p| matches!(p, Problem::MissingFile { .. })));
    assert!(report.problems.iter().any(|p| matches!(p, Problem::AllIndexMissing { .. })));
    assert!(report
        .problems
        .iter()
        .any(|p| matches!(p, Problem::DocrootsDiffer { file, .. } if file == "all.idx")));

    let fixed = validate(&targets[1], ValidateOptions { md5: false, fix: true }).unwrap();
    assert_eq!(fixed.fixed, vec![targets[1].all_index()]);
    assert_eq!(
        Index::load(&targets[1].all_index()).unwrap(),
        Index::load(&targets[0].all_index()).unwrap()
    );
    assert!(validate(&targets[1], ValidateOptions::default()).unwrap().is_ok());
}

#[test]
fn clean_publish_leaves_the_md5_cache_alone() {
    let source = tempfile::tempdir().expect("temp dir");
    let cache = tempfile::tempdir().expect("temp dir");
    let host = tempfile::tempdir().expect("temp dir");
    source_tree(source.path());
    let targets = vec![Docroot::new(host.path())];

    publish_to(&mut module(source.path(), cache.path()), targets.clone()).unwrap();
    let cache_file = cache.path().join("web.md5");
    let marker = UNIX_EPOCH + Duration::from_secs(100);
    std::fs::File::options()
        .write(true)
        .open(&cache_file)
        .unwrap()
        .set_modified(marker)
        .unwrap();

    let (report, _) = publish_to(&mut module(source.path(), cache.path()), targets).unwrap();
    assert_eq!(report.changed, 0);
    assert_eq!(std::fs::metadata(&cache_file).unwrap().modified().unwrap(), marker);
}

#[test]
fn content_shared_between_modules_survives_one_of_them_dropping_it() {
    let web_source = tempfile::tempdir().expect("temp dir");
    let flash_source = tempfile::tempdir().expect("temp dir");
    let cache = tempfile::tempdir().expect("temp dir");
    let host = tempfile::tempdir().expect("temp dir");
    let targets = vec![Docroot::new(host.path())];
    for source in [&web_source, &flash_source] {
        std::fs::write(source.path().join("logo.png"), "logo").unwrap();
    }
    std::fs::write(web_source.path().join("site.css"), "body{}").unwrap();

    let flash = |cache: &Path| {
        FileModule::new(ModuleConfig::new("flash").unwrap(), flash_source.path())
            .with_md5_cache(Md5Cache::load_or_create(cache.join("flash.md5")).unwrap())
    };

    let (_, web_index) = publish_to(&mut module(web_source.path(), cache.path()), targets.clone()).unwrap();
    let (_, flash_index) = publish_to(&mut flash(cache.path()), targets.clone()).unwrap();
    let shared = web_index.lookup("/logo.png").unwrap().lavendelized_path().to_string();
    assert_eq!(flash_index.lookup("/logo.png").unwrap().lavendelized_path(), shared);

    std::fs::remove_file(web_source.path().join("logo.png")).unwrap();
    let (_, web_index) = publish_to(&mut module(web_source.path(), cache.path()), targets.clone()).unwrap();
    assert!(web_index.lookup("/logo.png").is_none());

    let (report, _) = publish_to(&mut flash(cache.path()), targets.clone()).unwrap();
    assert_eq!(report.changed, 0);
    assert!(validate(&targets[0], ValidateOptions::default()).unwrap().is_ok());

    // nothing references the logo any more once flash drops it as well
    std::fs::remove_file(flash_source.path().join("logo.png")).unwrap();
    publish_to(&mut flash(cache.path()), targets.clone()).unwrap();
    let all = Index::load(&targets[0].all_index()).unwrap();
    assert_eq!(all.destination_md5(&shared), None);
    let gc = collect_garbage(&targets[0], false).unwrap();
    assert_eq!(gc.files, vec![targets[0].destination(&shared).unwrap()]);
}

#[test]
fn fixed_all_index_matches_its_peers_regardless_of_line_order() {
    let source = tempfile::tempdir().expect("temp dir");
    let cache = tempfile::tempdir().expect("temp dir");
    let hosts = [tempfile::tempdir().expect("temp dir"), tempfile::tempdir().expect("temp dir")];
    source_tree(source.path());
    let targets: Vec<_> = hosts.iter().map(|h| Docroot::new(h.path())).collect();

    // literal flash paths sort after the hex destinations of web
    let config = ModuleConfig::new("flash")
        .unwrap()
        .with_lavendelize(false)
        .with_target_path_prefix("flash");
    let mut jar = JarModule::from_entries(config, [JarEntry::new("intro.swf", "1-1", &b"swf"[..])]);
    publish_to(&mut jar, targets.clone()).unwrap();
    publish_to(&mut module(source.path(), cache.path()), targets.clone()).unwrap();

    std::fs::remove_file(targets[1].all_index()).unwrap();
    let fixed = validate(&targets[1], ValidateOptions { md5: false, fix: true }).unwrap();
    assert_eq!(fixed.fixed, vec![targets[1].all_index()]);
    assert_ne!(
        std::fs::read(targets[0].all_index()).unwrap(),
        std::fs::read(targets[1].all_index()).unwrap()
    );

    let report = validate_cluster(&targets, ValidateOptions::default()).unwrap();
    assert!(report.is_ok(), "{:?}", report.problems);
}
