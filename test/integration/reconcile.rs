// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{seed, Permissive, ScriptedConsole, WorkstationFixture, MACHINE};

use anyhow::Result;
use indoc::indoc;
use mync::{
    console::Confirmation,
    sync::{outcome::SkipReason, state::SyncRecord, EngineError, Overwrite},
};
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use std::fs;

const SHELLRC: &str = indoc! {r#"
    [[setting]]
    name = "shellrc"
    source = "shell/.bashrc"
    destination = "~/.bashrc"
    files = []
    folders = []
"#};

#[sealed_test]
fn sync_then_unsync_single_file() -> Result<()> {
    let fixture = WorkstationFixture::new(SHELLRC)?;
    let source = fixture.storage("shell/.bashrc");
    let destination = fixture.home(".bashrc");
    seed(&source, "export X=1")?;
    let console = ScriptedConsole::default();
    let engine = fixture.context().engine_with(&console, Permissive);

    let report = engine.sync()?;

    let backup = report.backup.expect("sync must back up first");
    assert_eq!(backup.len(), 1);
    assert_eq!(backup.skipped(SkipReason::NoSource), 1);
    assert_eq!(report.links.done(), 1);
    assert_eq!(fs::read_link(&destination)?, source);
    assert_eq!(
        engine.state().get(MACHINE)?,
        Some(vec![SyncRecord::synced(&source, &destination)])
    );

    let report = engine.unsync()?;

    assert_eq!(report.done(), 1);
    let meta = destination.symlink_metadata()?;
    assert!(meta.is_file());
    assert!(!meta.file_type().is_symlink());
    assert_eq!(fs::read_to_string(&destination)?, "export X=1");
    assert_eq!(engine.state().get(MACHINE)?, None);
    assert!(console.questions.borrow().is_empty());

    Ok(())
}

#[sealed_test]
fn push_and_pull_decomposed_setting() -> Result<()> {
    let fixture = WorkstationFixture::new(indoc! {r#"
        [[setting]]
        name = "vim"
        source = "vim"
        destination = "~"
        files = [".vimrc", ".gvimrc"]
        folders = [".vim"]
    "#})?;
    seed(fixture.home(".vimrc"), "syntax on")?;
    seed(fixture.home(".vim/colors/dark.vim"), "hi Normal")?;
    let console = ScriptedConsole::default();
    let engine = fixture.context().engine_with(&console, Permissive);

    let pushed = engine.push(Overwrite::Confirm)?;

    assert_eq!(pushed.done(), 2);
    assert_eq!(pushed.skipped(SkipReason::NoSource), 1);
    assert_eq!(fs::read_to_string(fixture.storage("vim/.vimrc"))?, "syntax on");
    assert_eq!(
        fs::read_to_string(fixture.storage("vim/.vim/colors/dark.vim"))?,
        "hi Normal"
    );

    fs::remove_dir_all(fixture.home(""))?;
    let pulled = engine.pull(Overwrite::Confirm)?;

    assert_eq!(pulled.done(), 2);
    assert!(fixture.home(".vim").is_dir());
    assert_eq!(fs::read_to_string(fixture.home(".vimrc"))?, "syntax on");
    assert!(console.questions.borrow().is_empty());

    Ok(())
}

#[sealed_test]
fn pull_asks_before_every_overwrite() -> Result<()> {
    let fixture = WorkstationFixture::new(indoc! {r#"
        [[setting]]
        name = "shell"
        source = "shell"
        destination = "~"
        files = [".bashrc", ".profile"]
    "#})?;
    seed(fixture.storage("shell/.bashrc"), "new bashrc")?;
    seed(fixture.storage("shell/.profile"), "new profile")?;
    seed(fixture.home(".bashrc"), "old bashrc")?;
    seed(fixture.home(".profile"), "old profile")?;
    let console = ScriptedConsole::answering([Confirmation::Decline, Confirmation::Proceed]);
    let engine = fixture.context().engine_with(&console, Permissive);

    let report = engine.pull(Overwrite::Confirm)?;

    assert_eq!(console.questions.borrow().len(), 2);
    assert_eq!(report.skipped(SkipReason::UserDeclined), 1);
    assert_eq!(report.done(), 1);
    assert_eq!(fs::read_to_string(fixture.home(".bashrc"))?, "old bashrc");
    assert_eq!(fs::read_to_string(fixture.home(".profile"))?, "new profile");

    Ok(())
}

#[sealed_test]
fn restore_after_destructive_edit() -> Result<()> {
    let fixture = WorkstationFixture::new(SHELLRC)?;
    seed(fixture.home(".bashrc"), "export X=1")?;
    let console = ScriptedConsole::answering([Confirmation::Proceed]);
    let engine = fixture.context().engine_with(&console, Permissive);

    engine.backup()?;
    fs::write(fixture.home(".bashrc"), "oops")?;
    let report = engine.restore()?;

    assert_eq!(report.done(), 1);
    assert_eq!(fs::read_to_string(fixture.home(".bashrc"))?, "export X=1");
    assert!(fixture
        .storage(".backup")
        .join(MACHINE)
        .join(".manifest.json")
        .exists());

    Ok(())
}

#[sealed_test]
fn declined_restore_is_canceled() -> Result<()> {
    let fixture = WorkstationFixture::new(SHELLRC)?;
    seed(fixture.home(".bashrc"), "export X=1")?;
    let console = ScriptedConsole::default();
    let engine = fixture.context().engine_with(&console, Permissive);

    engine.backup()?;
    fs::write(fixture.home(".bashrc"), "kept")?;
    let result = engine.restore();

    assert!(matches!(result, Err(EngineError::Canceled { .. })));
    assert_eq!(fs::read_to_string(fixture.home(".bashrc"))?, "kept");

    Ok(())
}

#[sealed_test]
fn machines_share_storage_without_interference() -> Result<()> {
    let fixture = WorkstationFixture::new(SHELLRC)?;
    seed(fixture.storage("shell/.bashrc"), "export X=1")?;
    let console = ScriptedConsole::default();
    let engine = fixture.context().engine_with(&console, Permissive);
    engine.state().put("machine-b", vec![SyncRecord::synced("/b/src", "/b/dst")])?;

    engine.sync()?;
    engine.unsync()?;

    assert_eq!(
        engine.state().get("machine-b")?,
        Some(vec![SyncRecord::synced("/b/src", "/b/dst")])
    );
    assert!(!engine.vault().exists("machine-b"));
    assert!(engine.vault().exists(MACHINE));
    assert!(fixture.root().join("mnt/shared/mync/.synced.json").exists());

    Ok(())
}

#[sealed_test]
fn folder_entry_with_trailing_separator_syncs() -> Result<()> {
    let fixture = WorkstationFixture::new(indoc! {r#"
        [[setting]]
        name = "vim"
        source = "vim"
        destination = "~"
        folders = [".vim/"]
    "#})?;
    seed(fixture.storage("vim/.vim/colors/dark.vim"), "hi Normal")?;
    seed(fixture.home(".vim/old.vim"), "set nocompatible")?;
    let console = ScriptedConsole::default();
    let engine = fixture.context().engine_with(&console, Permissive);

    let report = engine.sync()?;

    assert_eq!(report.links.done(), 1);
    assert_eq!(fs::read_link(fixture.home(".vim"))?, fixture.storage("vim/.vim"));
    assert!(engine
        .vault()
        .mirror(MACHINE, fixture.home(".vim/old.vim"))
        .exists());

    let report = engine.unsync()?;

    assert_eq!(report.done(), 1);
    assert!(!fixture.home(".vim").symlink_metadata()?.file_type().is_symlink());
    assert_eq!(
        fs::read_to_string(fixture.home(".vim/colors/dark.vim"))?,
        "hi Normal"
    );

    Ok(())
}
