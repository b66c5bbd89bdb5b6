//! paper-pack - Sprite Atlas Packer
//!
//! Packs a directory of PNG sprites into atlas pages. State is kept next to
//! the pages so later runs rebuild incrementally and sprites only move when
//! they have to.

mod manifest;
mod pages;
mod sources;
mod state;

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use paper_atlas::{run_build, AtlasSettings, BuildConfig, BuildReport, ConfirmRepack, PaddingMode, RepackPolicy, Sprite};
use tracing_subscriber::EnvFilter;

use crate::manifest::Manifest;
use crate::pages::PageWriter;
use crate::sources::load_sprites;
use crate::state::PackState;

#[derive(Parser, Debug, Clone)]
#[command(name = "paper-pack", version = paper_atlas::VERSION, about = "Pack PNG sprites into texture atlas pages")]
struct Cli {
    /// Directory of PNG sprite images
    input: PathBuf,

    /// Directory for pages, manifest and atlas state
    #[arg(short, long, default_value = "atlas")]
    output: PathBuf,

    /// Page width in pixels
    #[arg(long, default_value_t = 2048)]
    width: u32,

    /// Page height in pixels
    #[arg(long, default_value_t = 2048)]
    height: u32,

    /// Border pixels around each sprite
    #[arg(long, default_value_t = 2)]
    padding: u32,

    #[arg(long, value_enum, default_value_t = PaddingArg::Dilate)]
    padding_mode: PaddingArg,

    /// Mip levels per page, including the base level
    #[arg(long, default_value_t = 1)]
    mips: u32,

    /// What to do when a full repack would use fewer pages
    #[arg(long, value_enum, default_value_t = RepackArg::Keep)]
    repack: RepackArg,

    /// Discard the current layout and pack from scratch
    #[arg(long)]
    rebuild: bool,

    /// Skip the comparison against a from-scratch layout
    #[arg(long)]
    no_improvement_test: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum PaddingArg {
    Dilate,
    Zero,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum RepackArg {
    /// Keep the incremental layout
    Keep,
    /// Always take the smaller layout
    Always,
    /// Ask on the terminal
    Ask,
}

impl Cli {
    fn settings(&self) -> AtlasSettings {
        let mode = match self.padding_mode {
            PaddingArg::Dilate => PaddingMode::DilateBorder,
            PaddingArg::Zero => PaddingMode::PadWithZero,
        };
        AtlasSettings::new(self.width, self.height)
            .with_padding(self.padding)
            .with_padding_mode(mode)
            .with_mip_count(self.mips)
    }

    fn confirm(&self) -> Box<dyn ConfirmRepack> {
        match self.repack {
            RepackArg::Keep => Box::new(RepackPolicy::KeepIncremental),
            RepackArg::Always => Box::new(RepackPolicy::AlwaysRepack),
            RepackArg::Ask => Box::new(ask_on_terminal),
        }
    }
}

fn ask_on_terminal(message: &str) -> bool {
    print!("{message} [y/N] ");
    if io::stdout().flush().is_err() {
        return false;
    }

    let mut answer = String::new();
    if io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim(), "y" | "Y" | "yes")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let report = run(&cli)?;

    println!(
        "{} sprites on {} pages ({:.1}% used), {} moved, {} skipped",
        report.packed,
        report.page_count,
        report.utilization() * 100.0,
        report.updated.len(),
        report.skipped.len()
    );
    for skipped in &report.skipped {
        println!("  skipped {}: {}", skipped.sprite, skipped.error);
    }

    if !report.upload_errors.is_empty() {
        anyhow::bail!("{} pages failed to write", report.upload_errors.len());
    }
    Ok(())
}

/// One packing run: load state and sprites, build, write everything back
fn run(cli: &Cli) -> Result<BuildReport> {
    fs::create_dir_all(&cli.output)
        .with_context(|| format!("Failed to create output directory {}", cli.output.display()))?;

    let settings = cli.settings();
    let mut state = match PackState::load(&cli.output)? {
        Some(state) => state,
        None => {
            tracing::info!("No atlas state in {}, starting fresh", cli.output.display());
            PackState::new(settings)
        }
    };
    state.atlas.settings = settings;
    if cli.rebuild {
        state.atlas.request_rebuild();
    }

    let mut loaded = load_sprites(&cli.input, &mut state)?;
    let mut pages = PageWriter::new(&cli.output, state.next_texture, &state.textures);
    let config = BuildConfig {
        test_for_improvement: !cli.no_improvement_test,
    };

    let mut confirm = cli.confirm();
    let report = run_build(&mut state.atlas, &mut loaded.registry, &mut pages, confirm.as_mut(), &config);

    for texture in &report.released_textures {
        pages
            .release(*texture)
            .with_context(|| format!("Failed to delete files of {}", texture))?;
    }

    let manifest = Manifest::from_build(&state.atlas, &loaded, &pages);
    manifest.save(&cli.output)?;

    for (id, name) in &loaded.names {
        if let (Some(record), Some(sprite)) = (state.sprites.get_mut(name), loaded.registry.get(*id)) {
            record.backing = sprite.backing();
        }
    }
    state.retain_sprites(&loaded.file_names());
    state.textures = pages.records();
    state.next_texture = pages.next_handle();

    if state.atlas.needs_save() {
        state.save(&cli.output)?;
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use image::RgbaImage;

    use crate::manifest::MANIFEST_FILE;

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) {
        RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]))
            .save(dir.join(name))
            .unwrap();
    }

    fn cli(input: &Path, output: &Path) -> Cli {
        Cli::parse_from([
            "paper-pack",
            input.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
            "--width",
            "128",
            "--height",
            "128",
        ])
    }

    fn manifest(output: &Path) -> Manifest {
        let json = fs::read_to_string(output.join(MANIFEST_FILE)).unwrap();
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["paper-pack", "sprites"]);
        assert_eq!(cli.output, PathBuf::from("atlas"));
        assert_eq!(cli.settings(), AtlasSettings::default());
        assert_eq!(cli.repack, RepackArg::Keep);
    }

    #[test]
    fn test_first_run_writes_pages_and_manifest() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_png(input.path(), "big.png", 100, 60);
        write_png(input.path(), "small.png", 20, 20);

        let report = run(&cli(input.path(), output.path())).unwrap();
        assert_eq!(report.packed, 2);
        assert_eq!(report.page_count, 1);

        let manifest = manifest(output.path());
        assert_eq!(manifest.pages.len(), 1);
        assert!(output.path().join(&manifest.pages[0]).exists());
        let big = manifest.sprites.iter().find(|s| s.name == "big.png").unwrap();
        assert_eq!((big.x, big.y, big.width, big.height), (2, 2, 100, 60));
        assert_eq!(big.uv[0], 2.0 / 128.0);
    }

    #[test]
    fn test_second_run_moves_nothing() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_png(input.path(), "a.png", 50, 50);
        write_png(input.path(), "b.png", 30, 40);
        let cli = cli(input.path(), output.path());

        run(&cli).unwrap();
        let before = manifest(output.path());

        let report = run(&cli).unwrap();
        assert!(!report.full_rebuild);
        assert!(report.updated.is_empty());
        assert_eq!(manifest(output.path()), before);
    }

    #[test]
    fn test_grown_file_is_listed_unpacked() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_png(input.path(), "a.png", 50, 50);
        write_png(input.path(), "b.png", 50, 50);
        let cli = cli(input.path(), output.path());
        run(&cli).unwrap();

        write_png(input.path(), "a.png", 200, 40);
        let report = run(&cli).unwrap();
        assert_eq!(report.page_count, 1);
        assert_eq!(report.skipped.len(), 1);

        let manifest = manifest(output.path());
        assert_eq!(manifest.unpacked, vec!["a.png".to_string()]);
        assert_eq!(manifest.sprites.len(), 1);
        assert_eq!(manifest.sprites[0].name, "b.png");

        let state = PackState::load(output.path()).unwrap().unwrap();
        assert_eq!(state.sprites["a.png"].backing, None);
        assert!(state.sprites["b.png"].backing.is_some());
    }

    #[test]
    fn test_removed_file_is_evicted() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_png(input.path(), "a.png", 120, 120);
        write_png(input.path(), "b.png", 120, 120);
        let cli = cli(input.path(), output.path());

        assert_eq!(run(&cli).unwrap().page_count, 2);

        fs::remove_file(input.path().join("a.png")).unwrap();
        let report = run(&cli).unwrap();
        assert_eq!(report.evicted.len(), 1);
        assert_eq!(report.page_count, 1);
        assert_eq!(report.released_textures.len(), 1);
        assert!(!output.path().join(pages::page_file_name(report.released_textures[0], 0)).exists());

        let state = PackState::load(output.path()).unwrap().unwrap();
        assert!(!state.sprites.contains_key("a.png"));
        assert_eq!(state.textures.len(), 1);
    }
}
