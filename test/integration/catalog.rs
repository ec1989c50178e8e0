// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{seed, Permissive, ScriptedConsole, WorkstationFixture};

use anyhow::Result;
use mync::{
    catalog::{Added, SettingCatalog},
    config::Setting,
    console::Confirmation,
    context::StorageChange,
    sync::Overwrite,
};
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use std::fs;

#[sealed_test]
fn added_setting_is_persisted_and_synced() -> Result<()> {
    let mut fixture = WorkstationFixture::new("")?;
    let console = ScriptedConsole::default();

    let added = fixture.context_mut().catalog_mut().add(
        Setting::new("git", "git/.gitconfig", "~/.gitconfig"),
        &console,
    )?;
    assert_eq!(added, Added::New);

    let reopened = SettingCatalog::open(fixture.root().join("config.toml"))?;
    assert_eq!(reopened.list(), vec!["git"]);

    seed(fixture.home(".gitconfig"), "[user]\nname = alice")?;
    let engine = fixture.context().engine_with(&console, Permissive);
    let report = engine.push(Overwrite::Confirm)?;

    assert_eq!(report.done(), 1);
    assert_eq!(
        fs::read_to_string(fixture.storage("git/.gitconfig"))?,
        "[user]\nname = alice"
    );

    Ok(())
}

#[sealed_test]
fn conflicting_destination_needs_confirmation() -> Result<()> {
    let mut fixture = WorkstationFixture::new(
        "[[setting]]\nname = \"shellrc\"\nsource = \"shell/.bashrc\"\ndestination = \"~/.bashrc\"\n",
    )?;
    let declining = ScriptedConsole::default();
    let agreeing = ScriptedConsole::answering([Confirmation::Proceed]);
    let replacement = Setting::new("bash", "bash/rc", "~/.bashrc");

    let declined = fixture
        .context_mut()
        .catalog_mut()
        .add(replacement.clone(), &declining);
    assert!(declined.is_err());
    assert_eq!(fixture.context().catalog().list(), vec!["shellrc"]);

    let added = fixture
        .context_mut()
        .catalog_mut()
        .add(replacement, &agreeing)?;
    assert!(matches!(added, Added::Replaced(ref old) if old.len() == 1));
    assert_eq!(fixture.context().catalog().list(), vec!["bash"]);

    Ok(())
}

#[sealed_test]
fn storage_move_keeps_sync_state() -> Result<()> {
    let mut fixture = WorkstationFixture::new(
        "[[setting]]\nname = \"shellrc\"\nsource = \"shell/.bashrc\"\ndestination = \"~/.bashrc\"\n",
    )?;
    seed(fixture.storage("shell/.bashrc"), "export X=1")?;
    let console = ScriptedConsole::default();
    fixture.context().engine_with(&console, Permissive).sync()?;

    fs::create_dir_all(fixture.root().join("mnt/other"))?;
    let new_root = fixture.root().join("mnt/other");
    let change = fixture
        .context_mut()
        .set_storage(new_root.to_string_lossy())?;
    assert!(matches!(change, StorageChange::Moved { .. }));

    let moved = fixture.root().join("mnt/other/mync");
    assert_eq!(
        fs::read_to_string(moved.join("shell/.bashrc"))?,
        "export X=1"
    );
    assert!(moved.join(".synced.json").exists());
    assert!(moved.join(".backup").is_dir());
    assert_eq!(
        fixture.context().storage_dir(),
        fixture.root().join("mnt/other/mync")
    );

    Ok(())
}

#[sealed_test]
fn setup_prepares_storage_directory() -> Result<()> {
    let mut fixture = WorkstationFixture::new("")?;
    fs::create_dir_all(fixture.root().join("mnt/shared"))?;
    let console = ScriptedConsole::typing(["~/missing", ":shared", "dotfiles"]);

    let storage = fixture.context_mut().setup(&console)?;

    assert_eq!(storage, fixture.root().join("mnt/shared/dotfiles"));
    assert!(storage.is_dir());
    assert_eq!(console.questions.borrow().len(), 3);

    let reopened = SettingCatalog::open(fixture.root().join("config.toml"))?;
    assert_eq!(reopened.config().storage.root, ":shared");
    assert_eq!(reopened.config().storage.directory, "dotfiles");

    Ok(())
}
