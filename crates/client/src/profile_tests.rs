// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use super::*;

fn normalize(raw: serde_json::Value) -> anyhow::Result<User> {
    Ok(serde_json::from_value::<BackendUser>(raw)?.into())
}

#[test]
fn full_profile_is_mapped() -> anyhow::Result<()> {
    let user = normalize(json!({
        "id": "u-7",
        "email": "ana@example.com",
        "created_at": "2026-02-01T08:00:00Z",
        "profile": {
            "name": "Ana",
            "gender": "female",
            "birth_date": "1994-06-30",
            "height_cm": 171.5,
            "weight_kg": 64.0,
            "activity_level_id": 2,
            "activity_level_code": "light"
        }
    }))?;

    assert_eq!(
        user,
        User {
            id: "u-7".into(),
            email: "ana@example.com".into(),
            created_at: "2026-02-01T08:00:00Z".into(),
            name: "Ana".into(),
            gender: Gender::Female,
            birth_date: Some("1994-06-30".into()),
            height: Some(171.5),
            weight: Some(64.0),
            activity_level: Some("light".into()),
        }
    );
    Ok(())
}

#[yare::parameterized(
    missing_profile = { json!({ "id": 3, "email": "x@example.com", "created_at": "t" }) },
    null_profile    = { json!({ "id": 3, "email": "x@example.com", "created_at": "t", "profile": null }) },
    null_fields     = { json!({ "id": 3, "email": "x@example.com", "created_at": "t",
                                "profile": { "name": null, "gender": null, "height_cm": null } }) },
)]
fn absent_profile_uses_defaults(raw: serde_json::Value) {
    let user = normalize(raw).expect("normalize");
    assert_eq!(user.id, "3");
    assert_eq!(user.name, "");
    assert_eq!(user.gender, Gender::Male);
    assert_eq!(user.birth_date, None);
    assert_eq!(user.height, None);
    assert_eq!(user.weight, None);
    assert_eq!(user.activity_level, None);
}

#[test]
fn non_scalar_id_is_rejected() {
    let raw = json!({ "id": [1], "email": "x@example.com" });
    assert!(serde_json::from_value::<BackendUser>(raw).is_err());
}

#[yare::parameterized(
    empty         = { ProfileUpdate::default(), json!({}) },
    height_only   = { ProfileUpdate::default().height(Some(180.0)), json!({ "height_cm": 180.0 }) },
    explicit_null = { ProfileUpdate::default().weight(None), json!({ "weight_kg": null }) },
    all_fields    = {
        ProfileUpdate::default().height(None).weight(Some(70.5)).activity_level(Some("active".into())),
        json!({ "height_cm": null, "weight_kg": 70.5, "activity_level_code": "active" })
    },
)]
fn profile_update_is_tri_state(update: ProfileUpdate, expected: serde_json::Value) {
    assert_eq!(serde_json::to_value(&update).expect("serialize"), expected);
}

#[test]
fn registration_body_and_debug() -> anyhow::Result<()> {
    let data = RegistrationData {
        email: "new@example.com".into(),
        password: "hunter22".into(),
        name: "New".into(),
        gender: Gender::Female,
        birth_date: "2000-01-01".into(),
    };

    let body = serde_json::to_value(&data)?;
    assert_eq!(
        body,
        json!({
            "email": "new@example.com",
            "password": "hunter22",
            "name": "New",
            "gender": "female",
            "birth_date": "2000-01-01"
        })
    );
    assert!(!format!("{data:?}").contains("hunter22"));
    Ok(())
}
