mod fixtures;

use fixtures::*;

use pretty_assertions::assert_eq;
use tcglog::decoders::grub::GrubStringKind;
use tcglog::err::LogError;
use tcglog::{
    AlgorithmId, EventType, LogOptions, ParserSettings, Spec, TcgLogParser, TypedEventData,
};

fn parse(log: Vec<u8>, settings: ParserSettings) -> tcglog::Log {
    ensure_env_logger_initialized();
    TcgLogParser::from_buffer(log)
        .with_configuration(settings)
        .parse_log()
        .unwrap()
}

#[test]
fn test_it_parses_sample_log() {
    let log = parse(sample_log(), ParserSettings::new());

    assert_eq!(log.spec, Spec::Efi2);
    assert_eq!(log.algorithms, vec![AlgorithmId::SHA1, AlgorithmId::SHA256]);
    assert_eq!(log.events.len(), 7);

    let rendered: Vec<String> = log.events.iter().map(|e| e.data.to_string()).collect();
    assert_eq!(
        rendered[1..].to_vec(),
        vec![
            "1.0".to_owned(),
            "UEFI_VARIABLE_DATA{ VariableName: 8be4df61-93ca-11d2-aa0d-00e098032b8c, UnicodeName: \"SecureBoot\", VariableDataLength: 1 }".to_owned(),
            "Calling EFI Application from Boot Option".to_owned(),
            "".to_owned(),
            "".to_owned(),
            "Invalid event data: event data smaller than expected".to_owned(),
        ]
    );

    let var = log.events[2].data.as_efi_variable().unwrap();
    assert_eq!(var.unicode_name, "SecureBoot");
    assert_eq!(var.variable_data, vec![1]);
}

#[test]
fn test_every_event_keeps_its_raw_data() {
    let log = parse(sample_log(), ParserSettings::new());
    for event in &log.events {
        // The header record only carries a zero SHA-1 digest.
        if event.index == 0 {
            assert_eq!(event.digest(AlgorithmId::SHA1).unwrap().as_bytes(), &[0; 20]);
            continue;
        }
        let sha256 = event.digest(AlgorithmId::SHA256).unwrap();
        assert_eq!(
            sha256.as_bytes(),
            AlgorithmId::SHA256.hash(event.data.bytes()).unwrap().as_slice()
        );
    }
}

#[test]
fn test_parallel_and_sequential_decoding_agree() {
    let sequential = parse(sample_log(), ParserSettings::new().num_threads(1));
    let parallel = parse(sample_log(), ParserSettings::new().num_threads(4));
    assert_eq!(sequential, parallel);
}

#[test]
fn test_index_base() {
    let log = parse(sample_log(), ParserSettings::new().index_base(1));
    let indices: Vec<u32> = log.events.iter().map(|e| e.index).collect();
    assert_eq!(indices, (1..=7).collect::<Vec<u32>>());
}

#[test]
fn test_grub_decoder_when_enabled() {
    let options = LogOptions::new().with_grub(true);
    let log = parse(sample_log(), ParserSettings::new().log_options(options));

    let ipl = &log.events[4];
    assert_eq!(ipl.event_type, EventType::IPL);
    match ipl.data.as_typed() {
        Some(TypedEventData::Grub(grub)) => {
            assert_eq!(grub.kind, GrubStringKind::Command);
            assert_eq!(grub.value, "linux /vmlinuz");
        }
        other => panic!("expected a GRUB command, got {:?}", other),
    }
}

#[test]
fn test_systemd_efi_stub_decoder_when_enabled() {
    let mut cmdline = "root=/dev/vda2 ro"
        .encode_utf16()
        .flat_map(u16::to_le_bytes)
        .collect::<Vec<u8>>();
    cmdline.push(0);

    let raw = LogBuilder::crypto_agile(&[AlgorithmId::SHA256])
        .event(12, EventType::IPL, &cmdline)
        .event(12, EventType::IPL, b"not utf-16")
        .build();

    let options = LogOptions::new()
        .with_systemd_efi_stub(true)
        .systemd_efi_stub_pcr(12);
    let log = parse(raw, ParserSettings::new().log_options(options));

    assert_eq!(log.events[1].data.to_string(), "root=/dev/vda2 ro");
    let reason = log.events[2].data.invalid_reason().unwrap();
    assert!(!reason.is_truncated());
    assert_eq!(log.events[2].data.bytes(), b"not utf-16");
}

#[test]
fn test_tcg12_log() {
    let raw = LogBuilder::tcg12()
        .event(0, EventType::S_CRTM_VERSION, &utf16z("2.1"))
        .event(0, EventType::SEPARATOR, &[0xff; 4])
        .event(4, EventType::ACTION, b"Calling INT 19h")
        .build();

    let log = parse(raw, ParserSettings::new());
    assert_eq!(log.spec, Spec::Unknown);
    assert_eq!(log.algorithms, vec![AlgorithmId::SHA1]);
    assert_eq!(log.events.len(), 3);
    assert_eq!(log.events[0].data.to_string(), "2.1");
    assert_eq!(log.events[2].data.to_string(), "Calling INT 19h");
}

#[test]
fn test_separator_error_uses_digest_of_error_value() {
    let error_value: [u8; 4] = [1, 0, 0, 0];
    let raw = LogBuilder::crypto_agile(&[AlgorithmId::SHA1, AlgorithmId::SHA256])
        .event_with_digests(
            7,
            EventType::SEPARATOR,
            &[
                (AlgorithmId::SHA1, AlgorithmId::SHA1.hash(&error_value).unwrap()),
                (AlgorithmId::SHA256, AlgorithmId::SHA256.hash(&error_value).unwrap()),
            ],
            &[0x05, 0x00, 0x00, 0x00],
        )
        // A normal looking value is still an error code when the digest says so.
        .event_with_digests(
            7,
            EventType::SEPARATOR,
            &[
                (AlgorithmId::SHA1, AlgorithmId::SHA1.hash(&error_value).unwrap()),
                (AlgorithmId::SHA256, vec![0; 32]),
            ],
            &[0, 0, 0, 0],
        )
        .build();

    let log = parse(raw, ParserSettings::new());
    assert_eq!(log.events[1].data.to_string(), "ERROR: 0x5");
    assert_eq!(log.events[2].data.to_string(), "ERROR: 0x0");
}

#[test]
fn test_truncated_log_is_an_error() {
    let mut raw = sample_log();
    raw.truncate(raw.len() - 3);

    let err = TcgLogParser::from_buffer(raw).parse_log().unwrap_err();
    assert!(matches!(err, LogError::TruncatedRecord { index: 6, .. }));
}

#[test]
fn test_missing_file() {
    let err = TcgLogParser::from_path("/this/does/not/exist").err().unwrap();
    assert!(matches!(err, LogError::FailedToOpenFile { .. }));
}

#[test]
fn test_event_serializes_to_json() {
    let log = parse(sample_log(), ParserSettings::new());
    let value = log.events[5].to_json_value().unwrap();

    assert_eq!(
        value,
        serde_json::json!({
            "index": 5,
            "pcr_index": 7,
            "event_type": "EV_SEPARATOR",
            "digests": {
                "SHA-1": "9069ca78e7450a285173431b3e52c5c25299e473",
                "SHA-256": "df3f619804a92fdb4057192dc43dd748ea778adc52bc498ce80524c014b81119"
            },
            "data": {
                "kind": "typed",
                "data": {
                    "type": "separator",
                    "value": { "separator": "normal", "value": 0 }
                },
                "trailing_bytes": 0,
                "bytes": "00000000"
            }
        })
    );
}

#[test]
fn test_efi_variable_event_json() {
    let log = parse(sample_log(), ParserSettings::new());
    let json = log.events[2].to_json(true).unwrap();

    insta::assert_snapshot!(json, @r#"
    {
      "index": 2,
      "pcr_index": 7,
      "event_type": "EV_EFI_VARIABLE_DRIVER_CONFIG",
      "digests": {
        "SHA-1": "d4fdd1f14d4041494deb8fc990c45343d2277d08",
        "SHA-256": "ccfc4bb32888a345bc8aeadaba552b627d99348c767681ab3141f5b01e40a40e"
      },
      "data": {
        "kind": "typed",
        "data": {
          "type": "efi_variable",
          "value": {
            "variable_name": "8be4df61-93ca-11d2-aa0d-00e098032b8c",
            "unicode_name": "SecureBoot",
            "variable_data": "01"
          }
        },
        "trailing_bytes": 0,
        "bytes": "61dfe48bca93d211aa0d00e098032b8c0a00000000000000010000000000000053006500630075007200650042006f006f00740001"
      }
    }
    "#);
}
