//! Search paths over the real filesystem.

#![cfg(feature = "native")]

use std::path::Path;
use std::sync::Arc;

use searchfs_kernel::{
    GameFileSystemBuilder, LocalFs, Location, MountPointFactory, ReadDirOptions,
    SearchFsConfig,
};
use searchfs_testutil::{init_tracing, within, VpkBuilder};
use tempfile::TempDir;

fn install() -> TempDir {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    std::fs::create_dir_all(root.join("tf/custom/hud1/resource")).unwrap();
    std::fs::write(root.join("tf/custom/hud1/resource/ui.res"), "hud1").unwrap();
    std::fs::create_dir_all(root.join("tf/cfg")).unwrap();
    std::fs::write(root.join("tf/cfg/config.cfg"), "tf").unwrap();

    let (vpk, parts) = VpkBuilder::new()
        .preload_len(4)
        .file("resource/ui.res", b"archived ui")
        .file("maps/ctf_2fort.bsp", b"VBSP")
        .build_split();
    std::fs::write(root.join("tf/tf2_misc_dir.vpk"), vpk).unwrap();
    std::fs::write(root.join("tf/tf2_misc_000.vpk"), &parts[0]).unwrap();

    dir
}

fn config(root: &Path) -> SearchFsConfig {
    let toml = format!(
        r#"
install_root = "{}"

[[search_paths]]
key = "game+mod"
paths = "|gameinfo_path|custom/*"

[[search_paths]]
key = "game"
paths = ["|gameinfo_path|tf2_misc.vpk", "|gameinfo_path|."]
"#,
        root.display()
    );
    SearchFsConfig::from_toml_str(&toml).unwrap()
}

#[tokio::test]
async fn test_configured_install_resolves_and_reads() {
    let dir = install();
    let root = dir.path().canonicalize().unwrap();
    let config = config(&root);

    let factory = config.factory(Arc::new(LocalFs::new()));
    let game = config.builder(factory.clone()).unwrap().build(&config.manifest()).await;
    assert_eq!(game.search_paths().len(), 3);

    let ui = game.resolve_file("resource/ui.res").resolved().await.unwrap();
    assert_eq!(ui, Location::Host(root.join("tf/custom/hud1/resource/ui.res")));
    assert_eq!(game.read(&ui).await.unwrap(), b"hud1");

    let bsp = game.resolve_file("maps/ctf_2fort.bsp").resolved().await.unwrap();
    assert!(bsp.is_archive());
    assert_eq!(game.read(&bsp).await.unwrap(), b"VBSP");

    let top = game.read_directory("", &ReadDirOptions::default()).await.unwrap();
    let mut names: Vec<_> = top.iter().map(|e| e.name.as_str()).collect();
    names.sort();
    assert!(names.contains(&"resource"));
    assert!(names.contains(&"maps"));
    assert!(names.contains(&"cfg"));

    game.dispose();
    assert_eq!(factory.stats().live, 0);
}

#[tokio::test]
async fn test_loose_file_overrides_archive_live() {
    let dir = install();
    let root = dir.path().canonicalize().unwrap();

    let factory = MountPointFactory::new(Arc::new(LocalFs::new()));
    let manifest = searchfs_kernel::SearchPathManifest::new()
        .with("game", ["|gameinfo_path|cfg", "|gameinfo_path|tf2_misc.vpk"]);
    let game = GameFileSystemBuilder::new(factory, &root).build(&manifest).await;

    let mut live = game.resolve_file("maps/ctf_2fort.bsp");
    assert!(live.resolved().await.is_some_and(|l| l.is_archive()));

    // Let the recursive watcher pick up the new directory before writing into it
    std::fs::create_dir_all(root.join("tf/cfg/maps")).unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    std::fs::write(root.join("tf/cfg/maps/ctf_2fort.bsp"), "loose").unwrap();

    let loose = Location::Host(root.join("tf/cfg/maps/ctf_2fort.bsp"));
    within(live.wait_for(|v| v.as_ref() == Some(&loose))).await;

    std::fs::remove_file(root.join("tf/cfg/maps/ctf_2fort.bsp")).unwrap();
    within(live.wait_for(|v| v.as_ref().is_some_and(Location::is_archive))).await;
}
