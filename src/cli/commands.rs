//! Command handlers for DEM Fetcher CLI
//!
//! This module implements the command handlers that coordinate between CLI
//! arguments, configuration and the core pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::app::resolver::{DegreeGrid, FeatureGrid, GridIndex};
use crate::app::{AreaOfInterest, DemClient, Pipeline, PipelineReport, TileDescriptor};
use crate::cli::{ConfigAction, ConfigArgs, FetchArgs, ProgressConfig, ProgressDisplay, TilesArgs};
use crate::config::AppConfig;
use crate::errors::{AppError, Result};

/// Handle the fetch command
///
/// Runs the whole pipeline and prints the summary. Tiles that still fail
/// after every retry are listed but do not fail the command.
pub async fn handle_fetch(args: FetchArgs, mut config: AppConfig) -> Result<()> {
    args.apply(&mut config);
    config.validate()?;

    let aoi = AreaOfInterest::from_geojson_file(&args.aoi)?;
    let pipeline = build_pipeline(&config)?;
    info!(
        "Fetching {} {} tiles for {}",
        config.source.resolution,
        config.source.product,
        args.aoi.display()
    );

    let mut display = ProgressDisplay::new(ProgressConfig::default());
    display.start(pipeline.progress());
    let result = pipeline.run(&aoi).await;
    display.finish().await;

    let output = result?;
    print_summary(&output.report);
    Ok(())
}

/// Handle the tiles command (dry run)
pub async fn handle_tiles(args: TilesArgs, mut config: AppConfig) -> Result<()> {
    args.source.apply(&mut config);
    config.validate()?;

    let aoi = AreaOfInterest::from_geojson_file(&args.aoi)?;
    let pipeline = build_pipeline(&config)?;
    let descriptors = pipeline.resolver().resolve(&aoi).await?;

    print!("{}", format_tile_table(&descriptors));
    println!("{} tiles", descriptors.len());
    Ok(())
}

/// Handle the config command
pub async fn handle_config(args: ConfigArgs, config_override: Option<PathBuf>) -> Result<()> {
    match args.action {
        ConfigAction::Init { path, force } => {
            let path = match path {
                Some(path) => path,
                None => AppConfig::default_config_path()?,
            };
            AppConfig::init(&path, force).await?;
            println!("Created configuration file: {}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = AppConfig::load(config_override).await?;
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn build_pipeline(config: &AppConfig) -> Result<Pipeline> {
    let client = Arc::new(DemClient::with_config(config.client.clone())?);
    let grid = load_grid(config)?;
    Ok(Pipeline::with_client(config.pipeline_config(), client, grid)?)
}

fn load_grid(config: &AppConfig) -> Result<Arc<dyn GridIndex>> {
    match &config.source.grid_index {
        Some(path) => {
            let grid = FeatureGrid::from_geojson_file(path, &config.source.grid_code_property)?;
            if grid.is_empty() {
                return Err(AppError::generic(format!(
                    "Tile index {} contains no cells",
                    path.display()
                )));
            }
            debug!("Loaded {} cells from {}", grid.len(), path.display());
            Ok(Arc::new(grid))
        }
        None => Ok(Arc::new(DegreeGrid::new())),
    }
}

fn format_tile_table(descriptors: &[TileDescriptor]) -> String {
    let mut table = format!("{:>5}  {:<16}  {}\n", "ID", "CELL", "URL");
    for d in descriptors {
        table.push_str(&format!(
            "{:>5}  {:<16}  {}\n",
            d.id, d.grid_cell_code, d.remote_url
        ));
    }
    table
}

fn print_summary(report: &PipelineReport) {
    println!("{}", report.summary_line());
    println!("Output: {}", report.output_path.display());
    if let Some(preview) = &report.preview_path {
        println!("Preview: {}", preview.display());
    }
    if !report.kept_tiles.is_empty() {
        let dir = report
            .kept_tiles
            .first()
            .and_then(|p| p.parent())
            .unwrap_or_else(|| Path::new("."));
        println!("Kept {} tiles in {}", report.kept_tiles.len(), dir.display());
    }

    let failed = report.failed();
    if !failed.is_empty() {
        eprintln!("Warning: {} tiles could not be fetched:", failed.len());
        for d in failed {
            eprintln!("  {} {} ({})", d.id, d.grid_cell_code, d.remote_url);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_table() {
        let table = format_tile_table(&[TileDescriptor {
            id: 0,
            remote_url: "https://h/Copernicus_DSM_10_N47_00_E008_00.tar".to_string(),
            local_archive_name: "Copernicus_DSM_10_N47_00_E008_00.tar".to_string(),
            grid_cell_code: "N47_00_E008_00".to_string(),
        }]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("CELL"));
        assert!(lines[1].starts_with("    0  N47_00_E008_00"));
    }

    #[test]
    fn test_feature_grid_must_not_be_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.geojson");
        std::fs::write(&path, r#"{"type": "FeatureCollection", "features": []}"#).unwrap();

        let mut config = AppConfig::default();
        config.source.grid_index = Some(path);
        assert!(load_grid(&config).is_err());
    }

    #[tokio::test]
    async fn test_config_init_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let args = ConfigArgs {
            action: ConfigAction::Init {
                path: Some(path.clone()),
                force: false,
            },
        };
        handle_config(args, None).await.unwrap();
        assert!(AppConfig::load_from_file(&path).await.is_ok());
    }
}
