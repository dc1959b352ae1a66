use art_explorer::config::Config;
use std::io::Write;
use tempfile::tempdir;

fn write_config(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let td = tempdir().unwrap();
    let path = td.path().join("config.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    (td, path)
}

#[test]
fn defaults_apply_when_fields_are_omitted() {
    let (_td, path) = write_config("host = \"misskey.example\"\n");
    let cfg = Config::from_path(&path).unwrap();
    assert_eq!(cfg.host, "misskey.example");
    assert_eq!(cfg.flow, "miauth");
    assert_eq!(cfg.permission, "read:account");
    assert_eq!(cfg.verifier_length, 128);
    assert_eq!(cfg.http_timeout_secs, 10);
    assert_eq!(cfg.timeline_limit, 100);
    assert_eq!(cfg.public_base_url, "http://localhost:8080");
}

#[test]
fn explicit_values_override_defaults() {
    let (_td, path) = write_config(
        "host = \"mi.example\"\n\
         flow = \"oauth\"\n\
         public_base_url = \"https://art.example\"\n\
         verifier_length = 43\n\
         permission = \"read:account read:following\"\n",
    );
    let cfg = Config::from_path(&path).unwrap();
    assert_eq!(cfg.flow, "oauth");
    assert_eq!(cfg.verifier_length, 43);
    assert_eq!(cfg.public_base_url, "https://art.example");
    assert_eq!(cfg.permission, "read:account read:following");
}

#[test]
fn client_id_falls_back_to_public_base_url() {
    let (_td, path) = write_config("public_base_url = \"https://art.example\"\n");
    let cfg = Config::from_path(&path).unwrap();
    assert_eq!(cfg.client_id(), "https://art.example");

    let (_td2, path2) = write_config("client_id = \"https://other.example\"\n");
    let cfg2 = Config::from_path(&path2).unwrap();
    assert_eq!(cfg2.client_id(), "https://other.example");
}

#[test]
fn out_of_range_verifier_length_is_rejected() {
    for len in [0, 42, 129] {
        let (_td, path) = write_config(&format!("verifier_length = {}\n", len));
        assert!(Config::from_path(&path).is_err(), "length {} accepted", len);
    }
}

#[test]
fn unknown_flow_is_rejected() {
    let (_td, path) = write_config("flow = \"implicit\"\n");
    assert!(Config::from_path(&path).is_err());
}

#[test]
fn public_base_url_must_be_http_or_https() {
    let (_td, path) = write_config("public_base_url = \"not a url\"\n");
    assert!(Config::from_path(&path).is_err());

    let (_td2, path2) = write_config("public_base_url = \"ftp://art.example\"\n");
    assert!(Config::from_path(&path2).is_err());
}

#[test]
fn default_config_validates() {
    Config::default().validate().unwrap();
}
