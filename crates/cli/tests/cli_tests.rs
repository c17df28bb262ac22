//! Command line tests
//!
//! Argument parsing, config layering and full runs against files in a
//! temporary directory.

use clap::Parser;
use image::{Rgb, RgbImage};
use lopdf::{dictionary, Document, Object};
use merge::{Align, Color, DocumentOutput, MergeConfig, RenderMode};
use pretty_assertions::assert_eq;
use rsmerge_cli::{document_config, image_config, load_config, run, Cli, Command};
use std::io::Cursor;
use std::path::Path;
use zip::ZipArchive;

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("rsmerge").chain(args.iter().copied())).unwrap()
}

fn write_png(path: &Path) {
    RgbImage::from_pixel(240, 120, Rgb([255, 255, 255]))
        .save_with_format(path, image::ImageFormat::Png)
        .unwrap();
}

/// One-page form with text fields `name` and `city` and a signature `sig`
fn write_form(path: &Path) {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let page_id = doc.new_object_id();

    let mut field_ids = Vec::new();
    for (i, (name, kind)) in [("name", "Tx"), ("city", "Tx"), ("sig", "Sig")]
        .into_iter()
        .enumerate()
    {
        let y = 700 - 50 * i as i64;
        field_ids.push(doc.add_object(dictionary! {
            "FT" => kind,
            "T" => Object::string_literal(name),
            "Type" => "Annot",
            "Subtype" => "Widget",
            "Rect" => vec![50.into(), y.into(), 300.into(), (y + 20).into()],
            "P" => page_id,
        }));
    }
    let refs: Vec<Object> = field_ids.iter().map(|id| Object::Reference(*id)).collect();

    doc.objects.insert(
        page_id,
        Object::Dictionary(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            "Annots" => refs.clone(),
        }),
    );
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => 1,
            "Kids" => vec![page_id.into()],
        }),
    );
    let acroform_id = doc.add_object(dictionary! { "Fields" => refs });
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
        "AcroForm" => acroform_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

fn entry_names(path: &Path) -> Vec<String> {
    let bytes = std::fs::read(path).unwrap();
    let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    archive.file_names().map(str::to_string).collect()
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_parse_invite_defaults() {
    let cli = parse(&["invite", "-t", "card.png", "-c", "guests.csv"]);
    assert!(!cli.strict);
    assert_eq!(cli.verbose, 0);
    match cli.command {
        Command::Invite(args) => {
            assert_eq!(args.output, Path::new("invitations.zip"));
            assert_eq!(args.placement.font_size, None);
        }
        other => panic!("expected invite, got {other:?}"),
    }
}

#[test]
fn test_parse_global_flags_after_subcommand() {
    let cli = parse(&["fields", "-t", "form.pdf", "--json", "-vv", "--strict"]);
    assert_eq!(cli.verbose, 2);
    assert!(cli.strict);
}

#[test]
fn test_parse_rejects_out_of_range_values() {
    let args = ["rsmerge", "invite", "-t", "a.png", "-c", "b.csv", "--font-size", "5"];
    assert!(Cli::try_parse_from(args).is_err());

    let args = ["rsmerge", "fill", "-t", "a.pdf", "-c", "b.csv", "--dpi", "150"];
    assert!(Cli::try_parse_from(args).is_err(), "--dpi needs --jpeg");
}

#[test]
fn test_image_config_flags_override_file() {
    let base = MergeConfig::from_json(
        r##"{ "mode": "image", "keyColumn": "Name", "fontSize": 60, "color": "#ff0000" }"##,
    )
    .unwrap();
    let cli = parse(&[
        "invite", "-t", "a.png", "-c", "b.csv", "--font-size", "30", "--align", "left",
    ]);
    let Command::Invite(args) = cli.command else {
        panic!("expected invite");
    };

    let config = image_config(&args, Some(base)).unwrap();
    assert_eq!(config.key_column.as_deref(), Some("Name"));
    let RenderMode::Image(placement) = config.mode else {
        panic!("expected image mode");
    };
    assert_eq!(placement.font_size, 30);
    assert_eq!(placement.align, Align::Left);
    assert_eq!(placement.color, Color::from_rgb(255, 0, 0));
}

#[test]
fn test_image_config_rejects_bad_color() {
    let cli = parse(&["invite", "-t", "a.png", "-c", "b.csv", "--color", "blue"]);
    let Command::Invite(args) = cli.command else {
        panic!("expected invite");
    };
    assert!(image_config(&args, None).is_err());
}

#[test]
fn test_document_config_layers_mappings() {
    let dir = tempfile::tempdir().unwrap();
    let map_file = dir.path().join("mapping.json");
    std::fs::write(&map_file, r#"{ "name": "Full Name", "city": "Town" }"#).unwrap();

    let cli = parse(&[
        "fill",
        "-t",
        "a.pdf",
        "-c",
        "b.csv",
        "--map-file",
        path_str(&map_file),
        "--map",
        "city=City",
        "--jpeg",
        "--dpi",
        "150",
    ]);
    let Command::Fill(args) = cli.command else {
        panic!("expected fill");
    };

    let config = document_config(&args, None).unwrap();
    let RenderMode::Document(document) = config.mode else {
        panic!("expected document mode");
    };
    assert_eq!(document.mapping.column("name"), Some("Full Name"));
    assert_eq!(document.mapping.column("city"), Some("City"));
    assert_eq!(
        document.output,
        DocumentOutput::Jpeg {
            dpi: 150,
            quality: 75
        }
    );
}

#[test]
fn test_config_mode_must_match_command() {
    let base = MergeConfig::from_json(r#"{ "mode": "document" }"#).unwrap();
    let cli = parse(&["invite", "-t", "a.png", "-c", "b.csv"]);
    let Command::Invite(args) = cli.command else {
        panic!("expected invite");
    };
    assert!(image_config(&args, Some(base)).is_err());
}

#[test]
fn test_load_config_missing_file() {
    assert!(load_config(None).unwrap().is_none());
    assert!(load_config(Some(Path::new("/no/such/job.json"))).is_err());
}

#[test]
fn test_run_invite() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("card.png");
    let csv = dir.path().join("guests.csv");
    let output = dir.path().join("out.zip");
    write_png(&template);
    std::fs::write(&csv, "Name\nAlice\n\"\"\nBob\n").unwrap();

    run(parse(&[
        "invite",
        "-t",
        path_str(&template),
        "-c",
        path_str(&csv),
        "-o",
        path_str(&output),
    ]))
    .unwrap();

    assert_eq!(
        entry_names(&output),
        vec!["Alice.jpg", "Bob.jpg", "errors.json"]
    );
}

#[test]
fn test_run_preview() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("card.png");
    let output = dir.path().join("preview.jpg");
    write_png(&template);

    run(parse(&[
        "preview",
        "-t",
        path_str(&template),
        "--text",
        "Jane Doe",
        "--y-percent",
        "20",
        "-o",
        path_str(&output),
    ]))
    .unwrap();

    let image = image::open(&output).unwrap();
    assert_eq!((image.width(), image.height()), (240, 120));
}

#[test]
fn test_run_fill_and_fields() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("form.pdf");
    let csv = dir.path().join("people.csv");
    let output = dir.path().join("filled.zip");
    write_form(&template);
    std::fs::write(&csv, "Name,City\nAlice,Paris\nBob,Oslo\n").unwrap();

    run(parse(&["fields", "-t", path_str(&template), "--json"])).unwrap();
    run(parse(&[
        "fill",
        "-t",
        path_str(&template),
        "-c",
        path_str(&csv),
        "--map",
        "name=Name",
        "--map",
        "city=City",
        "--flatten",
        "-o",
        path_str(&output),
    ]))
    .unwrap();

    assert_eq!(
        entry_names(&output),
        vec!["Alice_filled.pdf", "Bob_filled.pdf"]
    );
}

#[test]
fn test_run_fill_strict_fails_but_writes_archive() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("form.pdf");
    let csv = dir.path().join("people.csv");
    let output = dir.path().join("filled.zip");
    write_form(&template);
    std::fs::write(&csv, "Name,Signed\nAlice,yes\nBob,\n").unwrap();

    let args = [
        "fill",
        "-t",
        path_str(&template),
        "-c",
        path_str(&csv),
        "--map",
        "sig=Signed",
        "-o",
        path_str(&output),
        "--strict",
    ];
    let err = run(parse(&args)).unwrap_err();
    assert!(err.to_string().contains("1/2 records failed"), "got: {err}");
    assert_eq!(
        entry_names(&output),
        vec!["Bob_filled.pdf", "errors.json"]
    );
}

#[test]
fn test_run_fields_rejects_image() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("card.png");
    write_png(&template);
    assert!(run(parse(&["fields", "-t", path_str(&template)])).is_err());
}
