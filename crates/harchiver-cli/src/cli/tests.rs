use super::*;

fn parse(args: &[&str]) -> CliCommand {
    let cli = Cli::try_parse_from(args).unwrap();
    cli.command
}

#[test]
fn cli_parse_record_defaults() {
    match parse(&["harchiver", "record", "https://example.com/"]) {
        CliCommand::Record {
            urls,
            out,
            headers,
            max_redirects,
            skip_images,
        } => {
            assert_eq!(urls, vec!["https://example.com/"]);
            assert_eq!(out, PathBuf::from("session.har"));
            assert!(headers.is_empty());
            assert!(max_redirects.is_none());
            assert!(!skip_images);
        }
        _ => panic!("expected Record"),
    }
}

#[test]
fn cli_parse_record_all_options() {
    match parse(&[
        "harchiver",
        "record",
        "--out",
        "/tmp/x.har",
        "-H",
        "Accept: text/html",
        "--header",
        "X-Trace: 1",
        "--max-redirects",
        "3",
        "--skip-images",
        "https://a.example/",
        "https://b.example/",
    ]) {
        CliCommand::Record {
            urls,
            out,
            headers,
            max_redirects,
            skip_images,
        } => {
            assert_eq!(urls.len(), 2);
            assert_eq!(out, PathBuf::from("/tmp/x.har"));
            assert_eq!(headers, vec!["Accept: text/html", "X-Trace: 1"]);
            assert_eq!(max_redirects, Some(3));
            assert!(skip_images);
        }
        _ => panic!("expected Record"),
    }
}

#[test]
fn cli_parse_record_requires_url() {
    assert!(Cli::try_parse_from(["harchiver", "record"]).is_err());
}

#[test]
fn cli_parse_inspect() {
    match parse(&["harchiver", "inspect", "session.har"]) {
        CliCommand::Inspect { path } => assert_eq!(path, PathBuf::from("session.har")),
        _ => panic!("expected Inspect"),
    }
}

#[test]
fn cli_rejects_unknown_subcommand() {
    assert!(Cli::try_parse_from(["harchiver", "import-har", "x.har"]).is_err());
}
