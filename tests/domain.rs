use assert_matches::assert_matches;
use camino::Utf8Path;

use imgt_scrape::domain::{
    FrameSelection, KNOWN_SPECIES, RawRequest, ScrapeRequest, SequenceType, Species,
};
use imgt_scrape::error::ScrapeError;

#[test]
fn species_normalization_is_idempotent() {
    let inputs = KNOWN_SPECIES
        .iter()
        .flat_map(|name| [name.to_string(), name.to_lowercase(), name.to_uppercase()])
        .chain([" homo   sapiens ".to_string(), "mUs".to_string()]);
    for input in inputs {
        let once: Species = input.parse().unwrap();
        let twice: Species = once.as_str().parse().unwrap();
        assert_eq!(once, twice, "input {input:?}");
    }
}

#[test]
fn sequence_type_is_case_insensitive() {
    assert_eq!("tcr".parse::<SequenceType>().unwrap(), SequenceType::Tcr);
    assert_eq!(" Ig ".parse::<SequenceType>().unwrap(), SequenceType::Ig);
    let err = "BCR".parse::<SequenceType>().unwrap_err();
    assert!(err.to_string().contains("IG, TCR"));
}

#[test]
fn frame_selection_rejects_unknown_values() {
    assert_eq!(
        "in-frame-gaps".parse::<FrameSelection>().unwrap(),
        FrameSelection::InFrameGaps
    );
    let err = "out-of-frame".parse::<FrameSelection>().unwrap_err();
    assert_matches!(err, ScrapeError::InvalidFrameSelection { .. });
}

#[test]
fn segment_catalogs_match_locus() {
    for segment in SequenceType::Tcr.segments() {
        assert!(segment.starts_with(SequenceType::Tcr.locus_prefix()));
    }
    for segment in SequenceType::Ig.segments() {
        assert!(segment.starts_with(SequenceType::Ig.locus_prefix()));
    }
    assert_eq!(SequenceType::Tcr.segments().len(), 10);
    assert_eq!(SequenceType::Ig.segments().len(), 7);
}

#[test]
fn explicit_output_dir_is_resolved_against_cwd() {
    let raw = RawRequest {
        species: "Danio rerio".to_string(),
        sequence_type: "IG".to_string(),
        output: Some("zebrafish".to_string()),
        frame_selection: Some("in-frame".to_string()),
        ..RawRequest::default()
    };
    let request = ScrapeRequest::from_raw(&raw, Utf8Path::new("/runs")).unwrap();
    assert_eq!(request.output_dir(), Utf8Path::new("/runs/zebrafish"));
    assert_eq!(request.frame_selection(), FrameSelection::InFrame);
    assert_eq!(
        request.segment_path("IGHV"),
        Utf8Path::new("/runs/zebrafish/IGHV.fasta")
    );
    assert_eq!(request.library_file_name(), "danio_rerio_ig_in-frame.fasta");
}

#[test]
fn invalid_frame_fails_request_construction() {
    let raw = RawRequest {
        species: "Mus".to_string(),
        sequence_type: "TCR".to_string(),
        frame_selection: Some("7.2".to_string()),
        ..RawRequest::default()
    };
    let err = ScrapeRequest::from_raw(&raw, Utf8Path::new("/runs")).unwrap_err();
    assert!(err.is_configuration());
}
