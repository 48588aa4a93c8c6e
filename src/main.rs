use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use anyhow::{Context, Result, anyhow, bail};
use log::{info, warn};
use material_forge::{
    CompilerConfig, Material, ShaderMap, ShaderMapCache,
    shader_map::NagaBackend,
    types::{Platform, Quality},
    validation,
};

#[derive(Debug, Default, Clone)]
struct Cli {
    material: Option<PathBuf>,
    config: Option<PathBuf>,
    platform: Option<Platform>,
    quality: Option<Quality>,
    switches: Vec<(String, bool)>,
    output_dir: Option<PathBuf>,
    no_validate: bool,
}

const USAGE: &str = "supported: --material <graph.json>, --config <config.json>, --platform <desktop|mobile|web>, \
--quality <low|high>, --switch <name=true|false>, --output-dir <dir>, --no-validate";

fn parse_cli(args: &[String]) -> Result<Cli> {
    let mut cli = Cli::default();
    let mut i = 0;
    while i < args.len() {
        let flag = args[i].as_str();
        let value = || {
            args.get(i + 1)
                .map(String::as_str)
                .ok_or_else(|| anyhow!("missing value for {flag}"))
        };
        match flag {
            "--material" => {
                cli.material = Some(PathBuf::from(value()?));
                i += 2;
            }
            "--config" => {
                cli.config = Some(PathBuf::from(value()?));
                i += 2;
            }
            "--platform" => {
                cli.platform = Some(value()?.parse()?);
                i += 2;
            }
            "--quality" => {
                cli.quality = Some(value()?.parse()?);
                i += 2;
            }
            "--switch" => {
                let v = value()?;
                let Some((name, on)) = v.split_once('=') else {
                    bail!("invalid --switch {v} (expected name=true|false)");
                };
                let on: bool = on
                    .parse()
                    .map_err(|_| anyhow!("invalid --switch {v} (expected name=true|false)"))?;
                cli.switches.push((name.to_string(), on));
                i += 2;
            }
            "--outputdir" | "--output-dir" => {
                cli.output_dir = Some(PathBuf::from(value()?));
                i += 2;
            }
            "--no-validate" => {
                cli.no_validate = true;
                i += 1;
            }
            other => {
                return Err(anyhow!("unknown argument: {other} ({USAGE})"));
            }
        }
    }
    Ok(cli)
}

fn resolve_config(cli: &Cli) -> Result<CompilerConfig> {
    let mut config = match cli.config.as_deref() {
        Some(path) => CompilerConfig::load_from_path(path)?,
        None => CompilerConfig::default(),
    };
    if let Some(platform) = cli.platform {
        config.platform = platform;
    }
    if let Some(quality) = cli.quality {
        config.quality = quality;
    }
    for (name, on) in &cli.switches {
        config.static_switches = config.static_switches.clone().with_bool(name.clone(), *on);
    }
    if cli.no_validate {
        config.validate_output = false;
    }
    Ok(config)
}

fn write_outputs(output_dir: &Path, stem: &str, map: &ShaderMap) -> Result<()> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output dir {}", output_dir.display()))?;

    let wgsl_path = output_dir.join(format!("{stem}.wgsl"));
    std::fs::write(&wgsl_path, &map.shader_text)
        .with_context(|| format!("failed to write {}", wgsl_path.display()))?;

    let entry_path = output_dir.join(format!("{stem}.shadermap.json"));
    let entry = serde_json::to_string_pretty(&map.to_entry())?;
    std::fs::write(&entry_path, entry)
        .with_context(|| format!("failed to write {}", entry_path.display()))?;

    println!("[compile] saved: {}", wgsl_path.display());
    println!("[compile] saved: {}", entry_path.display());
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let argv: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_cli(&argv)?;
    let config = resolve_config(&cli)?;

    let material_path = cli
        .material
        .clone()
        .ok_or_else(|| anyhow!("--material is required ({USAGE})"))?;
    let material = Material::load_from_path(&material_path)?;
    let key = config.key_for(material.id());
    let stem = material_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("material")
        .to_string();
    let output_dir = cli.output_dir.clone().unwrap_or_else(|| {
        material_path
            .parent()
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| PathBuf::from("."))
    });

    let cache = Arc::new(ShaderMapCache::with_workers(
        Arc::new(NagaBackend::new()),
        config.backend_workers,
    )?);
    let started = Instant::now();
    let map = match config.fallback_material.as_deref() {
        Some(path) => {
            let fallback = Material::load_from_path(path)?;
            cache.get_or_fallback(&material, &key, &fallback)?
        }
        None => cache
            .request(Arc::new(material), key.clone())
            .wait_timeout(config.compile_timeout())?,
    };
    if map.key.material_id != key.material_id {
        warn!("{} was substituted by '{}'", key.summary(), map.friendly_name);
    }
    info!(
        "Compiled {} in {:.1} ms ({})",
        map.key.summary(),
        started.elapsed().as_secs_f64() * 1000.0,
        map.uniform_expression_set.summary()
    );

    if config.validate_output {
        validation::validate_wgsl_with_context(&map.shader_text, &format!("material {}", map.friendly_name))?;
    }
    write_outputs(&output_dir, &stem, &map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_overrides() {
        let cli = parse_cli(&args(&[
            "--material",
            "m.json",
            "--platform",
            "mobile",
            "--switch",
            "Wet=true",
            "--no-validate",
        ]))
        .unwrap();
        assert_eq!(cli.platform, Some(Platform::Mobile));
        assert_eq!(cli.switches, vec![("Wet".to_string(), true)]);

        let config = resolve_config(&cli).unwrap();
        assert!(!config.validate_output);
        assert_eq!(config.static_switches.get_bool("Wet"), Some(true));
    }

    #[test]
    fn rejects_malformed_switches() {
        assert!(parse_cli(&args(&["--switch", "Wet"])).is_err());
        assert!(parse_cli(&args(&["--switch", "Wet=maybe"])).is_err());
        assert!(parse_cli(&args(&["--material"])).is_err());
    }
}
