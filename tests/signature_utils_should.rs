use tierstream::server::utils::signature_utils::{GrantClaims, SignatureUtil};

fn claims() -> GrantClaims {
    GrantClaims {
        video_id: "video1".to_string(),
        file_id: "drivefile1".to_string(),
        user_id: 42,
        email: "viewer@example.com".to_string(),
        checksum: "0cc175b9c0f1b6a831c399e269772661".to_string(),
    }
}

#[test]
fn test_signature_generation() {
    let util = SignatureUtil::new("test_secret".to_string());
    let sig1 = util.generate_signature("payload");
    let sig2 = util.generate_signature("payload");

    assert_eq!(sig1, sig2);
    assert_eq!(sig1.len(), 64);
    assert_ne!(sig1, util.generate_signature("other payload"));
}

#[test]
fn test_grant_verification() {
    let util = SignatureUtil::new("test_secret".to_string());
    let grant = util.issue_grant(&claims());

    // valid grant should verify
    assert_eq!(util.verify_grant(&grant), Some(claims()));

    // another secret should fail
    let other = SignatureUtil::new("other_secret".to_string());
    assert!(other.verify_grant(&grant).is_none());

    // garbage should fail
    assert!(util.verify_grant("invalid").is_none());
    assert!(util.verify_grant("").is_none());
}

#[test]
fn test_tampered_grant() {
    let util = SignatureUtil::new("test_secret".to_string());
    let grant = util.issue_grant(&claims());
    let (_, signature) = grant.split_once('.').unwrap();

    // someone else's claims under our signature
    let mut forged = claims();
    forged.user_id = 7;
    let forged_payload = util.issue_grant(&forged);
    let (forged_payload, _) = forged_payload.split_once('.').unwrap();

    assert!(util.verify_grant(&format!("{}.{}", forged_payload, signature)).is_none());
}

#[test]
fn test_malformed_signature() {
    let util = SignatureUtil::new("test_secret".to_string());
    let grant = util.issue_grant(&claims());
    let (payload, signature) = grant.split_once('.').unwrap();

    // non-hex, truncated or missing signatures
    assert!(util.verify_grant(&format!("{}.zz{}", payload, &signature[2..])).is_none());
    assert!(util.verify_grant(&format!("{}.{}", payload, &signature[..32])).is_none());
    assert!(util.verify_grant(&format!("{}.", payload)).is_none());
}
