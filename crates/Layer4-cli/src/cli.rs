//! Command runners

use crate::Command;
use anyhow::Context;
use plugkit_core::{
    GallerySnapshot, PluginGallery, PluginManager, PluginRecord, PluginsOverview,
};
use plugkit_foundation::PlugkitConfig;
use std::sync::Arc;

/// 명령 실행
pub async fn run(command: Command, config: &PlugkitConfig) -> anyhow::Result<()> {
    let manager = PluginManager::from_config(config).context("failed to set up plugin manager")?;
    manager.init().await.context("failed to load installed plugins")?;

    match command {
        Command::List => {
            print!("{}", format_overview(&manager.overview().await));
        }
        Command::Install { url } => {
            let record = manager.install(&url, None).await?;
            println!("✓ Installed {} v{}", record.id, record.manifest.version);
        }
        Command::Uninstall { id } => {
            manager.uninstall(&id).await?;
            println!("✓ Uninstalled {}", id);
        }
        Command::Enable { id } => {
            manager.activate(&id).await?;
            print_status(&manager, &id).await;
        }
        Command::Disable { id } => {
            manager.disable(&id).await?;
            print_status(&manager, &id).await;
        }
        Command::Update { id: Some(id) } => {
            let record = manager.update(&id).await?;
            println!("✓ Updated {} to v{}", record.id, record.manifest.version);
        }
        Command::Update { id: None } => {
            let outcomes = manager.update_all().await;
            if outcomes.is_empty() {
                println!("No plugins installed.");
            }
            let mut failed = 0;
            for (id, outcome) in outcomes {
                match outcome {
                    Ok(record) => println!("✓ {} v{}", id, record.manifest.version),
                    Err(e) => {
                        failed += 1;
                        println!("✗ {}: {}", id, e);
                        if e.is_retryable() {
                            println!("  retry with 'plugkit update {}'", id);
                        }
                    }
                }
            }
            if failed > 0 {
                anyhow::bail!("{} plugin update(s) failed", failed);
            }
        }
        Command::Gallery { search, offline } => {
            let gallery = PluginGallery::from_config(config, manager.fetcher(), manager.events());
            let snapshot = load_gallery(&gallery, offline).await?;
            let installed = manager.plugins().await;
            print!(
                "{}",
                format_gallery(&snapshot, search.as_deref(), &installed)
            );
        }
        Command::GalleryInstall { name } => {
            let gallery = PluginGallery::from_config(config, manager.fetcher(), manager.events());
            let snapshot = load_gallery(&gallery, false).await?;
            let record = manager.install_from_gallery(&snapshot, &name).await?;
            println!("✓ Installed {} v{}", record.id, record.manifest.version);
        }
        Command::Outdated => {
            let gallery = PluginGallery::from_config(config, manager.fetcher(), manager.events());
            let snapshot = load_gallery(&gallery, false).await?;
            let updates = manager.available_updates(&snapshot).await;
            if updates.is_empty() {
                println!("All plugins are up to date.");
            }
            for update in updates {
                println!(
                    "{:<24} {:<12} -> {:<12}",
                    update.id, update.installed_version, update.available_version
                );
            }
        }
        Command::UseLocale { id } => {
            let locale = manager.apply_locale(&id).await?;
            println!("✓ Locale set to {}", locale);
        }
        Command::UseTheme { id } => {
            let theme = manager.apply_theme(&id).await?;
            println!("✓ Theme set to {}", theme);
        }
    }

    Ok(())
}

async fn print_status(manager: &PluginManager, id: &str) {
    match manager.plugin(id).await {
        Some(record) => println!("{} is {}", record.id, record.status),
        None => println!("Plugin '{}' is not installed.", id),
    }
}

/// 갤러리 로드. 네트워크 실패 시 캐시로 대체
async fn load_gallery(
    gallery: &PluginGallery,
    offline: bool,
) -> anyhow::Result<Arc<GallerySnapshot>> {
    if !offline {
        match gallery.load_plugins().await {
            Ok(snapshot) => return Ok(snapshot),
            Err(e) => {
                gallery.load_cache().await?;
                match gallery.gallery() {
                    Some(cached) => {
                        eprintln!("Warning: {} (showing cached gallery)", e);
                        return Ok(cached);
                    }
                    None => return Err(e.into()),
                }
            }
        }
    }

    gallery.load_cache().await?;
    gallery
        .gallery()
        .context("no cached gallery, run 'plugkit gallery' while online first")
}

// ============================================================================
// 출력 포맷
// ============================================================================

fn format_overview(overview: &PluginsOverview) -> String {
    let mut out = String::new();

    if overview.plugins.is_empty() {
        out.push_str("No plugins installed.\n");
    } else {
        out.push_str(&format!(
            "{:<24} {:<12} {:<12} {:<20}\n",
            "ID", "Version", "Status", "Installed"
        ));
        out.push_str(&format!("{}\n", "-".repeat(70)));
        for plugin in &overview.plugins {
            out.push_str(&format_record(plugin));
        }
    }

    if let Some(url) = &overview.installing {
        out.push_str(&format!("\nInstalling: {}\n", url));
    } else if let Some(error) = &overview.last_install_error {
        out.push_str(&format!(
            "\nLast install of {} failed: {}\n",
            overview.last_install_url, error
        ));
    }
    out
}

fn format_record(record: &PluginRecord) -> String {
    let mut line = format!(
        "{:<24} {:<12} {:<12} {:<20}\n",
        truncate(&record.id, 24),
        truncate(&record.manifest.version, 12),
        record.status.as_str(),
        record.install_time.format("%Y-%m-%d %H:%M")
    );
    if let Some(error) = &record.install_error {
        line.push_str(&format!("  install error: {}\n", error));
    }
    if let Some(error) = &record.update_error {
        let checked = record
            .update_check_date
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        line.push_str(&format!("  update error ({}): {}\n", checked, error));
    }
    line
}

fn format_gallery(
    snapshot: &GallerySnapshot,
    search: Option<&str>,
    installed: &[PluginRecord],
) -> String {
    let entries = match search {
        Some(query) => snapshot.search(query),
        None => snapshot.plugins.iter().collect(),
    };
    if entries.is_empty() {
        return "No plugins found.\n".to_string();
    }

    let mut out = format!(
        "{:<24} {:<12} {:<10} {:<40}\n",
        "Name", "Version", "", "Description"
    );
    out.push_str(&format!("{}\n", "-".repeat(88)));
    for entry in entries {
        let manifest = &entry.manifest;
        let marker = if installed.iter().any(|p| p.id == manifest.name) {
            "installed"
        } else {
            ""
        };
        out.push_str(&format!(
            "{:<24} {:<12} {:<10} {:<40}\n",
            truncate(&manifest.name, 24),
            truncate(&manifest.version, 12),
            marker,
            truncate(manifest.description.as_deref().unwrap_or(""), 40)
        ));
    }
    out
}

/// Truncate a string for display
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugkit_core::{GalleryEntry, PluginManifest, PluginStatus};
    use tempfile::TempDir;

    fn record(id: &str, status: PluginStatus) -> PluginRecord {
        PluginRecord::new(
            PluginManifest::new(id, "1.0.0"),
            format!("https://x.test/{}.json", id),
        )
        .with_status(status)
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a-very-long-plugin-name", 10), "a-very-...");
        assert_eq!(truncate("한글플러그인이름", 5), "한글...");
    }

    #[test]
    fn test_format_overview() {
        let mut failing = record("b", PluginStatus::Active);
        failing.update_error = Some("Network error".into());

        let overview = PluginsOverview {
            plugins: vec![record("a", PluginStatus::Disabled), failing],
            last_install_url: "https://x.test/c.json".into(),
            last_install_error: Some("Invalid manifest: missing 'name'".into()),
            installing: None,
        };
        let out = format_overview(&overview);
        assert!(out.contains("disabled"));
        assert!(out.contains("update error"));
        assert!(out.contains("Last install of https://x.test/c.json failed"));
    }

    #[test]
    fn test_format_overview_empty() {
        let overview = PluginsOverview {
            plugins: vec![],
            last_install_url: String::new(),
            last_install_error: None,
            installing: None,
        };
        assert_eq!(format_overview(&overview), "No plugins installed.\n");
    }

    #[test]
    fn test_format_gallery_marks_installed() {
        let snapshot = GallerySnapshot::new(vec![
            GalleryEntry {
                url: "https://x.test/a/".into(),
                manifest: PluginManifest::new("a", "1.0").with_description("Dark theme"),
            },
            GalleryEntry {
                url: "https://x.test/b/".into(),
                manifest: PluginManifest::new("b", "2.0"),
            },
        ]);
        let installed = vec![record("a", PluginStatus::Active)];

        let out = format_gallery(&snapshot, None, &installed);
        assert!(out.contains("installed"));
        assert_eq!(out.lines().count(), 4);

        let out = format_gallery(&snapshot, Some("dark"), &installed);
        assert_eq!(out.lines().count(), 3);

        let out = format_gallery(&snapshot, Some("nothing"), &installed);
        assert_eq!(out, "No plugins found.\n");
    }

    #[tokio::test]
    async fn test_run_against_empty_data_dir() {
        let temp = TempDir::new().unwrap();
        let config = PlugkitConfig::new()
            .data_dir(temp.path().join("data"))
            .cache_dir(temp.path().join("cache"));

        run(Command::List, &config).await.unwrap();
        run(
            Command::Disable {
                id: "missing".into(),
            },
            &config,
        )
        .await
        .unwrap();

        let err = run(
            Command::UseLocale {
                id: "missing".into(),
            },
            &config,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Not found"));

        assert!(run(Command::Update { id: None }, &config).await.is_ok());
        assert!(run(
            Command::Gallery {
                search: None,
                offline: true
            },
            &config
        )
        .await
        .is_err());
    }
}
