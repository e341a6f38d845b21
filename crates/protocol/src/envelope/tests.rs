use super::*;

#[test]
fn request_header_carries_code_in_tag() {
    let header = FrameHeader::new(FrameKind::Request(ServiceCode::Start), 11).expect("constructible header");
    let raw = header.encode_raw();

    assert_eq!((raw >> 24) as u8, REQUEST_BASE + ServiceCode::Start.as_u8());
    assert_eq!(raw & 0x00FF_FFFF, 11);
}

#[test]
fn notification_header_decodes_from_bytes() {
    let kind = FrameKind::Notification(ReverseCode::RestoreOnFileReady);
    let header = FrameHeader::new(kind, 300).expect("constructible header");

    let decoded = FrameHeader::try_from(header.encode()).expect("array conversion succeeds");
    assert_eq!(decoded.kind(), kind);
    assert_eq!(decoded.payload_len(), 300);
}

#[test]
fn reply_tag_is_fixed() {
    let header = FrameHeader::new(FrameKind::Reply, 0).expect("constructible header");
    assert_eq!(header.encode()[3], REPLY_TAG);
}

#[test]
fn decode_rejects_short_input() {
    let err = FrameHeader::decode(&[0x01, 0x02]).expect_err("short header must fail");
    assert_eq!(err, EnvelopeError::TruncatedHeader { actual: 2 });
}

#[test]
fn decode_rejects_tag_below_request_range() {
    let raw = u32::from(0x10u8) << 24;
    let err = FrameHeader::from_raw(raw).expect_err("low tag must fail");
    assert_eq!(err, EnvelopeError::InvalidTag(0x10));
}

#[test]
fn decode_rejects_unknown_codes() {
    let unknown_request = u32::from(REQUEST_BASE + 60) << 24;
    assert_eq!(
        FrameHeader::from_raw(unknown_request),
        Err(EnvelopeError::UnknownServiceCode(60))
    );

    let unknown_notification = u32::from(NOTIFY_BASE + 33) << 24;
    assert_eq!(
        FrameHeader::from_raw(unknown_notification),
        Err(EnvelopeError::UnknownReverseCode(33))
    );
}

#[test]
fn new_rejects_oversized_payload() {
    let len = MAX_PAYLOAD_LENGTH as usize + 1;
    assert_eq!(
        FrameHeader::new(FrameKind::Reply, len),
        Err(EnvelopeError::OversizedPayload(len))
    );
}

#[test]
fn every_kind_survives_its_tag() {
    let kinds = ServiceCode::ALL
        .into_iter()
        .map(FrameKind::Request)
        .chain(ReverseCode::ALL.into_iter().map(FrameKind::Notification))
        .chain(std::iter::once(FrameKind::Reply));
    for kind in kinds {
        assert_eq!(FrameKind::from_tag(kind.tag()), Ok(kind), "{kind}");
    }
}
