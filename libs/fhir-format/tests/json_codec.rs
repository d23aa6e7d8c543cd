use fhirkit_format::{json, FormatError, FormatOptions};
use fhirkit_models::{core_registry, Element, Primitive, Resource};
use serde_json::{json, Value};

fn encode(resource: &Resource) -> Value {
    let bytes = json::to_vec(core_registry(), resource, FormatOptions::default()).unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn decode(input: &str) -> Result<Resource, FormatError> {
    json::from_slice(core_registry(), input.as_bytes())
}

fn nickname() -> Element {
    Element::extension("http://example.org/nickname", Primitive::boolean(true))
}

#[test]
fn sidecar_arrays_stay_aligned() {
    let name = Element::new("HumanName").with_all(
        "given",
        [
            Primitive::string("Peter"),
            Primitive::string("James"),
            Primitive::string("Jim").with_extension(nickname()),
        ],
    );
    let patient = Resource::new("Patient").with_all("name", [name]);

    let value = encode(&patient);
    assert_eq!(value["name"][0]["given"], json!(["Peter", "James", "Jim"]));
    assert_eq!(
        value["name"][0]["_given"],
        json!([null, null, {"extension": [{"url": "http://example.org/nickname", "valueBoolean": true}]}])
    );
}

#[test]
fn value_less_primitives_keep_their_position() {
    let name = Element::new("HumanName").with_all(
        "given",
        [
            Primitive::empty("string").with_id("first"),
            Primitive::string("James"),
        ],
    );
    let patient = Resource::new("Patient").with_all("name", [name]);

    let value = encode(&patient);
    assert_eq!(value["name"][0]["given"], json!([null, "James"]));
    assert_eq!(value["name"][0]["_given"], json!([{"id": "first"}, null]));

    let bytes = serde_json::to_vec(&value).unwrap();
    assert_eq!(json::from_slice(core_registry(), &bytes).unwrap(), patient);
}

#[test]
fn metadata_only_primitive() {
    let patient = Resource::new("Patient").with("active", Primitive::empty("boolean").with_extension(nickname()));
    let value = encode(&patient);
    assert!(value.get("active").is_none());
    assert_eq!(value["_active"]["extension"][0]["valueBoolean"], json!(true));
}

#[test]
fn decimal_text_is_written_verbatim() {
    let quantity = Element::new("Quantity")
        .with("value", Primitive::decimal("1.10").unwrap())
        .with("unit", Primitive::string("mg"));
    let observation = Resource::new("Observation")
        .with("status", Primitive::code("final"))
        .with("value", quantity);

    let bytes = json::to_vec(core_registry(), &observation, FormatOptions::default()).unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert_eq!(
        text,
        r#"{"resourceType":"Observation","status":"final","valueQuantity":{"value":1.10,"unit":"mg"}}"#
    );

    let back = json::from_slice(core_registry(), text.as_bytes()).unwrap();
    assert_eq!(back, observation);
}

#[test]
fn sidecar_before_value_decodes_the_same() {
    let value_first = decode(r#"{"resourceType":"Patient","birthDate":"1974-12-25","_birthDate":{"id":"b"}}"#).unwrap();
    let sidecar_first = decode(r#"{"resourceType":"Patient","_birthDate":{"id":"b"},"birthDate":"1974-12-25"}"#).unwrap();
    assert_eq!(value_first, sidecar_first);

    let choice_first = decode(
        r#"{"resourceType":"Observation","status":"final","valueString":"x","_valueString":{"id":"v"}}"#,
    )
    .unwrap();
    let choice_sidecar_first = decode(
        r#"{"resourceType":"Observation","_valueString":{"id":"v"},"status":"final","valueString":"x"}"#,
    )
    .unwrap();
    assert_eq!(choice_first, choice_sidecar_first);
    let value = choice_first.get_primitive("value").unwrap();
    assert_eq!(value.type_name, "string");
    assert_eq!(value.meta.id.as_deref(), Some("v"));
}

#[test]
fn unknown_field_names_field_and_type() {
    match decode(r#"{"resourceType":"Patient","bogus":1}"#) {
        Err(FormatError::UnknownField { field, type_name }) => {
            assert_eq!(field, "bogus");
            assert_eq!(type_name, "Patient");
        }
        other => panic!("expected an unknown field error, got {:?}", other),
    }

    // Nested types report the innermost type
    match decode(r#"{"resourceType":"Patient","name":[{"family":"x","nickname":"y"}]}"#) {
        Err(FormatError::UnknownField { field, type_name }) => {
            assert_eq!(field, "nickname");
            assert_eq!(type_name, "HumanName");
        }
        other => panic!("expected an unknown field error, got {:?}", other),
    }
}

#[test]
fn unknown_resource_type_is_reported() {
    assert!(matches!(
        decode(r#"{"resourceType":"Spaceship","id":"x"}"#),
        Err(FormatError::UnknownResourceType(ref name)) if name == "Spaceship"
    ));
    assert!(matches!(
        decode(r#"{"resourceType":"Patient","contained":[{"resourceType":"Spaceship"}]}"#),
        Err(FormatError::UnknownResourceType(ref name)) if name == "Spaceship"
    ));
}

#[test]
fn choice_field_emits_one_key() {
    for value in [
        Primitive::boolean(true),
        Primitive::text("dateTime", "2020-01-01").with_id("d"),
    ] {
        let patient = Resource::new("Patient").with("deceased", value);
        let encoded = encode(&patient);
        let keys: Vec<&String> = encoded
            .as_object()
            .unwrap()
            .keys()
            .filter(|k| k.trim_start_matches('_').starts_with("deceased"))
            .collect();
        assert!(!keys.is_empty() && keys.len() <= 2, "{:?}", keys);
        let value_keys: Vec<_> = keys.iter().filter(|k| !k.starts_with('_')).collect();
        assert_eq!(value_keys.len(), 1, "{:?}", keys);
    }
}

#[test]
fn every_observation_value_variant_round_trips() {
    let quantity = Element::new("Quantity").with("value", Primitive::decimal("4.0").unwrap());
    let variants: Vec<fhirkit_models::Value> = vec![
        quantity.clone().into(),
        Element::new("CodeableConcept").with("text", Primitive::string("pos")).into(),
        Primitive::string("text").into(),
        Primitive::boolean(false).into(),
        Primitive::integer(-3).into(),
        Element::new("Range").with("low", quantity.clone()).into(),
        Element::new("Ratio").with("numerator", quantity.clone()).into(),
        Element::new("SampledData")
            .with("origin", quantity)
            .with("period", Primitive::decimal("10").unwrap())
            .with("dimensions", Primitive::new("positiveInt", fhirkit_models::PrimitiveValue::Integer(1)))
            .into(),
        Primitive::text("time", "10:00:00").into(),
        Primitive::text("dateTime", "2024").into(),
        Element::new("Period").with("start", Primitive::text("dateTime", "2024")).into(),
    ];

    for variant in variants {
        let type_name = variant.type_name().to_string();
        let observation = Resource::new("Observation")
            .with("status", Primitive::code("final"))
            .with("value", variant);
        let bytes = json::to_vec(core_registry(), &observation, FormatOptions::default()).unwrap();
        let back = json::from_slice(core_registry(), &bytes)
            .unwrap_or_else(|e| panic!("{}: {}", type_name, e));
        assert_eq!(back, observation, "{}", type_name);
    }
}

#[test]
fn contained_resource_dispatches_on_resource_type() {
    let observation = Resource::new("Observation")
        .with("id", Primitive::text("id", "o1"))
        .with("status", Primitive::code("final"));
    let patient = Resource::new("Patient").with_all("contained", [observation.clone()]);

    let value = encode(&patient);
    assert_eq!(value["contained"][0]["resourceType"], "Observation");

    let bytes = serde_json::to_vec(&value).unwrap();
    let back = json::from_slice(core_registry(), &bytes).unwrap();
    let contained = back.get_all("contained")[0].as_resource().unwrap();
    assert_eq!(contained.resource_type(), "Observation");
    assert_eq!(contained, &observation);
}

#[test]
fn resource_type_may_come_last() {
    let resource = decode(r#"{"id":"x","active":true,"resourceType":"Patient"}"#).unwrap();
    assert_eq!(resource.resource_type(), "Patient");
    assert_eq!(resource.id(), Some("x"));
}

#[test]
fn structural_errors_carry_offsets() {
    match decode(r#"{"resourceType":"Patient","name":{"family":"x"}}"#) {
        Err(FormatError::UnexpectedToken { expected, found, offset }) => {
            assert_eq!(expected, "'['");
            assert_eq!(found, "'{'");
            assert_eq!(offset, 33);
        }
        other => panic!("expected a token error, got {:?}", other),
    }
    assert!(matches!(
        decode(r#"{"resourceType":"Patient","active":"true"}"#),
        Err(FormatError::UnexpectedToken { .. })
    ));
    assert!(matches!(
        decode(r#"{"resourceType":"Patient""#),
        Err(FormatError::UnexpectedToken { .. })
    ));
}

#[test]
fn integer_ranges_are_checked() {
    let telecom = |rank: &str| format!(r#"{{"resourceType":"Patient","telecom":[{{"rank":{}}}]}}"#, rank);
    assert!(decode(&telecom("1")).is_ok());
    assert!(matches!(decode(&telecom("0")), Err(FormatError::TypeConversion { .. })));
    assert!(matches!(decode(&telecom("1.5")), Err(FormatError::TypeConversion { .. })));
}

#[test]
fn pretty_and_compact_decode_the_same() {
    let patient = Resource::new("Patient")
        .with("id", Primitive::text("id", "p"))
        .with("gender", Primitive::code("other").with_id("g"));
    let compact = json::to_vec(core_registry(), &patient, FormatOptions::default()).unwrap();
    let pretty = json::to_vec(core_registry(), &patient, FormatOptions::pretty()).unwrap();
    assert_ne!(compact, pretty);
    assert_eq!(
        json::from_slice(core_registry(), &compact).unwrap(),
        json::from_slice(core_registry(), &pretty).unwrap()
    );
}

#[test]
fn elements_encode_without_resource_type() {
    let registry = core_registry();
    let coding = Element::new("Coding")
        .with("system", Primitive::uri("http://loinc.org"))
        .with("code", Primitive::code("1234-5"));
    let bytes = json::element_to_vec(registry, "Coding", &coding, FormatOptions::default()).unwrap();
    assert_eq!(bytes, br#"{"system":"http://loinc.org","code":"1234-5"}"#);
    assert_eq!(json::element_from_slice(registry, "Coding", &bytes).unwrap(), coding);
}
