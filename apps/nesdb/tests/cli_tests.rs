//! # CLI Tests
//!
//! Argument parsing, config precedence and command round trips against a
//! temporary data root.

#![allow(clippy::unwrap_used, clippy::panic)]

use clap::Parser;
use nesdb::cli::{self, Cli, Commands, RunFlags};
use nesdb_core::{NesConfig, NesError};
use std::fs;
use tempfile::TempDir;

fn config_in(dir: &TempDir) -> NesConfig {
    NesConfig {
        data_root: dir.path().join("data"),
        migrations_dir: dir.path().join("migrations"),
        ..NesConfig::default()
    }
}

// =============================================================================
// ARGUMENT PARSING
// =============================================================================

mod parsing {
    use super::*;

    #[test]
    fn run_requires_name_or_all() {
        assert!(Cli::try_parse_from(["nesdb", "run"]).is_err());
        assert!(Cli::try_parse_from(["nesdb", "run", "--all"]).is_ok());
        assert!(Cli::try_parse_from(["nesdb", "run", "001-seed"]).is_ok());
    }

    #[test]
    fn run_name_conflicts_with_all() {
        assert!(Cli::try_parse_from(["nesdb", "run", "001-seed", "--all"]).is_err());
    }

    #[test]
    fn verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["nesdb", "-v", "-q", "list"]).is_err());
    }

    #[test]
    fn run_flags_are_parsed() {
        let cli = Cli::try_parse_from([
            "nesdb",
            "run",
            "--all",
            "--dry-run",
            "--no-commit",
            "--continue-on-failure",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                name,
                all,
                dry_run,
                force,
                no_commit,
                continue_on_failure,
            } => {
                assert_eq!(name, None);
                assert!(all && dry_run && no_commit && continue_on_failure);
                assert!(!force);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn create_requires_author() {
        assert!(Cli::try_parse_from(["nesdb", "create", "party-seats"]).is_err());
        let cli =
            Cli::try_parse_from(["nesdb", "create", "party-seats", "--author", "jane"]).unwrap();
        assert!(matches!(cli.command, Commands::Create { .. }));
    }

    #[test]
    fn search_defaults_limit() {
        let cli = Cli::try_parse_from(["nesdb", "search", "congress"]).unwrap();
        match cli.command {
            Commands::Search { limit, kind, .. } => {
                assert_eq!(limit, 20);
                assert_eq!(kind, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::try_parse_from(["nesdb", "pending", "--json-mode", "-D", "/srv/nes"]).unwrap();
        assert!(cli.json_mode);
        assert_eq!(cli.data_root.as_deref(), Some(std::path::Path::new("/srv/nes")));
    }
}

// =============================================================================
// CONFIG PRECEDENCE
// =============================================================================

mod config {
    use super::*;

    #[test]
    fn flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nesdb.toml");
        fs::write(
            &path,
            "data_root = \"from-file\"\nmigrations_dir = \"file-migrations\"\ncommit_batch_size = 50\n",
        )
        .unwrap();

        let mut config = NesConfig::from_file(&path).unwrap();
        let cli = Cli::try_parse_from(["nesdb", "-D", "from-flag", "list"]).unwrap();
        cli::apply_flags(&mut config, &cli);

        assert_eq!(config.data_root, std::path::PathBuf::from("from-flag"));
        assert_eq!(config.migrations_dir, std::path::PathBuf::from("file-migrations"));
        assert_eq!(config.commit_batch_size, 50);
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::try_parse_from([
            "nesdb",
            "-c",
            dir.path().join("absent.toml").to_str().unwrap(),
            "list",
        ])
        .unwrap();
        assert!(matches!(cli::resolve_config(&cli), Err(NesError::IoError(_))));
    }
}

// =============================================================================
// COMMANDS
// =============================================================================

mod commands {
    use super::*;

    #[test]
    fn create_then_run_without_commit() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);

        cli::cmd_create(&config, true, "party-seats", "jane", None).unwrap();
        let unit_dir = config.migrations_dir.join("000-party-seats");
        assert!(unit_dir.join("migration.toml").is_file());

        let flags = RunFlags {
            no_commit: true,
            ..RunFlags::default()
        };
        cli::cmd_run(&config, true, Some("000-party-seats"), flags).unwrap();
    }

    #[test]
    fn run_unknown_unit_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        let result = cli::cmd_run(&config, true, Some("042-missing"), RunFlags::default());
        assert!(matches!(result, Err(NesError::NotFound(_))));
    }

    #[test]
    fn show_missing_entity_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        let result = cli::cmd_show(&config, true, "entity:person/nobody");
        assert!(matches!(result, Err(NesError::NotFound(_))));
    }

    #[test]
    fn bad_direction_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        let result = cli::cmd_traverse(&config, true, "entity:person/nobody", "sideways", None);
        assert!(matches!(result, Err(NesError::ValidationError(_))));
    }

    #[test]
    fn search_and_integrity_on_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        cli::cmd_search(&config, true, "congress", Some("organization"), None, 5).unwrap();
        cli::cmd_integrity(&config, true, None).unwrap();
    }
}
