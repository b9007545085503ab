use super::*;
use clap::Parser;

#[test]
fn parses_daemon_start() {
    let cli = Cli::try_parse_from(["oj", "daemon", "start"]).unwrap();
    assert!(matches!(cli.command, Command::Daemon { command: daemon::DaemonCommand::Start }));
}

#[test]
fn parses_convoy_check_with_id() {
    let cli = Cli::try_parse_from(["oj", "convoy", "check", "cv-1"]).unwrap();
    match cli.command {
        Command::Convoy { command: convoy::ConvoyCommand::Check { convoy_id } } => {
            assert_eq!(convoy_id.as_deref(), Some("cv-1"));
        }
        _ => panic!("expected Convoy::Check"),
    }
}

#[test]
fn parses_convoy_check_without_id() {
    let cli = Cli::try_parse_from(["oj", "convoy", "check"]).unwrap();
    match cli.command {
        Command::Convoy { command: convoy::ConvoyCommand::Check { convoy_id } } => {
            assert_eq!(convoy_id, None);
        }
        _ => panic!("expected Convoy::Check"),
    }
}

#[test]
fn parses_refinery_merge() {
    let cli = Cli::try_parse_from(["oj", "refinery", "merge", "mr-7", "--repo", "/tmp/repo"]).unwrap();
    match cli.command {
        Command::Refinery { command: refinery::RefineryCommand::Merge { mr_id, .. } } => {
            assert_eq!(mr_id, "mr-7");
        }
        _ => panic!("expected Refinery::Merge"),
    }
}

#[test]
fn rejects_unknown_subcommand() {
    assert!(Cli::try_parse_from(["oj", "bogus"]).is_err());
}
