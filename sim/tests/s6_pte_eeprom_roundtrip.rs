use pte::{PersoDataV1, PteAction, PteServer};

fn padded(s: &str) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[..s.len()].copy_from_slice(s.as_bytes());
    out
}

#[test]
fn write_then_read_back_the_perso_record_over_the_ee_commands() {
    let record = PersoDataV1 {
        hwid: 0,
        region: 0,
        serial: padded("TestSerial"),
        deveui: [1, 2, 3, 4, 5, 6, 7, 8],
        joineui: [0xF1, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6, 0xF7, 0xF8],
        nwkkey: *b"QWERTYUIASDFGHJK",
        appkey: *b"qwertyuiasdfghjk",
    };
    let packed = record.pack();

    let mut server = PteServer::new(4096);
    let offset: u16 = 0x0060;

    for (chunk_idx, chunk) in packed.chunks(32).enumerate() {
        let chunk_offset = offset + (chunk_idx * 32) as u16;
        let mut payload = Vec::new();
        payload.extend_from_slice(&chunk_offset.to_le_bytes());
        payload.extend_from_slice(&0u16.to_le_bytes());
        payload.extend_from_slice(chunk);
        let (res, _, action) = server.handle(pte::CMD_EE_WRITE, &payload);
        assert_eq!(res, pte::RES_OK);
        assert_eq!(action, PteAction::None);
    }

    let mut readback = Vec::new();
    let mut remaining = packed.len();
    let mut pos = offset;
    while remaining > 0 {
        let n = remaining.min(255);
        let payload = [&pos.to_le_bytes()[..], &[n as u8]].concat();
        let (res, data, _) = server.handle(pte::CMD_EE_READ, &payload);
        assert_eq!(res, pte::RES_OK);
        readback.extend_from_slice(&data);
        pos += n as u16;
        remaining -= n;
    }

    assert_eq!(readback, packed);
    let roundtripped = PersoDataV1::unpack(&readback).unwrap();
    assert_eq!(roundtripped, record);
}

#[test]
fn nop_reset_and_run_report_the_expected_action() {
    let mut server = PteServer::new(16);
    assert_eq!(server.handle(pte::CMD_NOP, &[]).0, pte::RES_NOP_ACK);
    assert_eq!(server.handle(pte::CMD_RESET, &[]).2, PteAction::Reset);
    assert_eq!(server.handle(pte::CMD_RUN, &[]).2, PteAction::Run);
}
