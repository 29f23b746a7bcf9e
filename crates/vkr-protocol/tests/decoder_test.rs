//! Integration test: command stream decoding
//!
//! Feeds encoder-built streams (and damaged copies of them) through the
//! decoder. No renderer involved.
//!
//! Run with: cargo test -p vkr-protocol --test decoder_test

use vkr_protocol::commands::*;
use vkr_protocol::opcode::COMMAND_HEADER_LEN;
use vkr_protocol::{Command, CommandEncoder, CommandFlags, DecodeError, Decoder, ObjectType, Opcode};

fn sample_stream() -> Vec<u8> {
    let mut enc = CommandEncoder::new();
    enc.push_with_reply(&Command::CreateInstance(CreateInstanceArgs {
        instance: 1,
        api_version: 1 << 22 | 3 << 12,
        application_name: "decoder-test".to_string(),
        engine_name: String::new(),
        enabled_extensions: vec!["VK_KHR_get_physical_device_properties2".to_string()],
    }))
    .push(
        CommandFlags::empty(),
        &Command::CreateObject(CreateObjectArgs {
            device: 3,
            object: 10,
            info: CreateInfo::Buffer(BufferCreateInfo {
                flags: 0,
                size: 4096,
                usage: 0x20,
                sharing_mode: 0,
                queue_family_indices: vec![0, 1],
            }),
        }),
    )
    .push(
        CommandFlags::empty(),
        &Command::Record {
            command_buffer: 40,
            op: RecordedCommand::Dispatch(CmdDispatch {
                group_count: [8, 4, 1],
            }),
        },
    )
    .push(
        CommandFlags::empty(),
        &Command::DestroyObject(
            DestroyObjectArgs::new(ObjectType::Buffer, 3, Some(10)).expect("destroyable"),
        ),
    );
    enc.finish()
}

#[test]
fn test_decodes_commands_in_stream_order() {
    let bytes = sample_stream();
    let mut decoder = Decoder::new(&bytes);
    let commands: Vec<_> = decoder.by_ref().collect();
    assert!(!decoder.is_fatal());
    assert_eq!(commands.len(), 4);

    assert!(commands[0].wants_reply());
    assert!(!commands[1].wants_reply());

    let opcodes: Vec<_> = commands.iter().map(|c| c.command.opcode()).collect();
    assert_eq!(
        opcodes,
        vec![
            Opcode::CreateInstance,
            Opcode::CreateBuffer,
            Opcode::CmdDispatch,
            Opcode::DestroyBuffer
        ]
    );

    match &commands[1].command {
        Command::CreateObject(args) => {
            assert_eq!(args.object, 10);
            assert_eq!(args.info.object_type(), ObjectType::Buffer);
        }
        other => panic!("expected CreateObject, got {:?}", other),
    }
    match &commands[3].command {
        Command::DestroyObject(args) => {
            assert_eq!(args.object_type(), ObjectType::Buffer);
            assert_eq!(args.object, Some(10));
        }
        other => panic!("expected DestroyObject, got {:?}", other),
    }
}

#[test]
fn test_truncation_at_every_boundary_is_fatal_or_clean() {
    let bytes = sample_stream();
    for len in 0..bytes.len() {
        let mut decoder = Decoder::new(&bytes[..len]);
        let decoded = decoder.by_ref().count();
        assert!(decoder.position() <= len);
        if decoder.is_fatal() {
            assert!(decoded < 4);
        } else {
            // A clean end only happens when the cut left less than a header.
            assert!(len - decoder.position() < COMMAND_HEADER_LEN);
        }
    }
}

#[test]
fn test_empty_and_short_buffers_decode_nothing() {
    for len in 0..COMMAND_HEADER_LEN {
        let bytes = vec![0u8; len];
        let mut decoder = Decoder::new(&bytes);
        assert!(!decoder.has_command());
        assert!(decoder.decode_command().is_none());
        assert!(!decoder.is_fatal());
    }
}

#[test]
fn test_unknown_opcode_is_sticky_fatal() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&0xDEADu32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&sample_stream());

    let mut decoder = Decoder::new(&bytes);
    assert!(decoder.decode_command().is_none());
    assert_eq!(decoder.error(), Some(&DecodeError::UnknownOpcode(0xDEAD)));
    assert!(!decoder.has_command());
    assert!(decoder.decode_command().is_none());
}

#[test]
fn test_hostile_count_is_rejected() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&Opcode::FreeCommandBuffers.as_raw().to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&1u64.to_le_bytes());
    bytes.extend_from_slice(&2u64.to_le_bytes());
    bytes.extend_from_slice(&u32::MAX.to_le_bytes());

    let mut decoder = Decoder::new(&bytes);
    assert!(decoder.decode_command().is_none());
    assert!(matches!(
        decoder.error(),
        Some(DecodeError::CountTooLarge { .. })
    ));
}

#[test]
fn test_invalid_object_type_is_fatal() {
    let mut enc = CommandEncoder::new();
    enc.push(
        CommandFlags::empty(),
        &Command::SetDebugUtilsObjectName(SetDebugUtilsObjectNameArgs {
            device: 3,
            object_type: ObjectType::Buffer,
            object: 10,
            name: "vertices".to_string(),
        }),
    );
    let mut bytes = enc.finish();
    // object_type follows the header and the device id
    bytes[COMMAND_HEADER_LEN + 8..COMMAND_HEADER_LEN + 12].copy_from_slice(&99u32.to_le_bytes());

    let mut decoder = Decoder::new(&bytes);
    assert!(decoder.decode_command().is_none());
    assert!(matches!(
        decoder.error(),
        Some(DecodeError::InvalidValue { field: "object_type", value: 99 })
    ));
}

#[test]
fn test_unsupported_opcode_consumes_rest_of_buffer() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&Opcode::CreateGraphicsPipelines.as_raw().to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&[0xAB; 37]);

    let mut decoder = Decoder::new(&bytes);
    let decoded = decoder.decode_command().expect("unsupported commands still decode");
    assert_eq!(
        decoded.command,
        Command::Unsupported {
            opcode: Opcode::CreateGraphicsPipelines
        }
    );
    assert!(!decoder.has_command());
    assert!(!decoder.is_fatal());
}
