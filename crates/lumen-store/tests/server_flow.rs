//! End-to-end flows through the facade: routed interactions in, response
//! envelopes out, with runtime-registered search parameters, topics and
//! subscriptions.

use lumen_api::{Interaction, StatusCode, Verb};
use lumen_store::{AuthorizationInfo, FhirStore, RoutedRequest, StoreConfig};
use lumen_subscriptions::{ContentLevel, NotificationType};
use serde_json::{Value, json};

fn facade() -> FhirStore {
    FhirStore::new(StoreConfig::default())
}

async fn create(facade: &FhirStore, body: Value) -> lumen_api::FhirResponse {
    let type_name = body["resourceType"].as_str().expect("resourceType").to_string();
    facade
        .dispatch(
            RoutedRequest::new(Interaction::TypeCreate(type_name)).with_body(body.to_string()),
        )
        .await
}

async fn read(facade: &FhirStore, type_name: &str, id: &str) -> lumen_api::FhirResponse {
    facade
        .dispatch(RoutedRequest::new(Interaction::InstanceRead(
            type_name.to_string(),
            id.to_string(),
        )))
        .await
}

async fn search(facade: &FhirStore, type_name: &str, query: &str) -> Value {
    let response = facade
        .dispatch(
            RoutedRequest::new(Interaction::TypeSearch(type_name.to_string()))
                .with_query(query),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "search failed: {response:?}");
    serde_json::from_str(response.resource.as_deref().expect("bundle body")).expect("bundle json")
}

async fn search_total(facade: &FhirStore, type_name: &str, query: &str) -> u64 {
    search(facade, type_name, query).await["total"]
        .as_u64()
        .expect("bundle total")
}

async fn register_demo_parameters(facade: &FhirStore) {
    let definitions = [
        json!({
            "resourceType": "SearchParameter",
            "id": "Patient-name",
            "url": "http://hl7.org/fhir/SearchParameter/Patient-name",
            "code": "name",
            "type": "string",
            "base": ["Patient"],
            "expression": "Patient.name"
        }),
        json!({
            "resourceType": "SearchParameter",
            "id": "Patient-gender",
            "url": "http://hl7.org/fhir/SearchParameter/Patient-gender",
            "code": "gender",
            "type": "token",
            "base": ["Patient"],
            "expression": "Patient.gender"
        }),
        json!({
            "resourceType": "SearchParameter",
            "id": "Observation-code",
            "url": "http://hl7.org/fhir/SearchParameter/Observation-code",
            "code": "code",
            "type": "token",
            "base": ["Observation"],
            "expression": "Observation.code"
        }),
        json!({
            "resourceType": "SearchParameter",
            "id": "Observation-value-quantity",
            "url": "http://hl7.org/fhir/SearchParameter/Observation-value-quantity",
            "code": "value-quantity",
            "type": "quantity",
            "base": ["Observation"],
            "expression": "Observation.valueQuantity"
        }),
        json!({
            "resourceType": "SearchParameter",
            "id": "Observation-subject",
            "url": "http://hl7.org/fhir/SearchParameter/Observation-subject",
            "code": "subject",
            "type": "reference",
            "base": ["Observation"],
            "expression": "Observation.subject",
            "target": ["Patient", "Device"]
        }),
        json!({
            "resourceType": "SearchParameter",
            "id": "Observation-patient",
            "url": "http://hl7.org/fhir/SearchParameter/Observation-patient",
            "code": "patient",
            "type": "reference",
            "base": ["Observation"],
            "expression": "Observation.subject",
            "target": ["Patient"]
        }),
        json!({
            "resourceType": "SearchParameter",
            "id": "Observation-code-value-quantity",
            "url": "http://hl7.org/fhir/SearchParameter/Observation-code-value-quantity",
            "code": "code-value-quantity",
            "type": "composite",
            "base": ["Observation"],
            "component": [
                {"definition": "http://hl7.org/fhir/SearchParameter/Observation-code"},
                {"definition": "http://hl7.org/fhir/SearchParameter/Observation-value-quantity"}
            ]
        }),
    ];

    for definition in definitions {
        let response = create(facade, definition).await;
        assert_eq!(response.status, StatusCode::CREATED);
    }
}

fn patient_example() -> Value {
    json!({
        "resourceType": "Patient",
        "id": "example",
        "gender": "male",
        "name": [{"family": "Chalmers", "given": ["Peter", "James"], "use": "official"}]
    })
}

fn weight_observation(id: &str, subject: &str) -> Value {
    json!({
        "resourceType": "Observation",
        "id": id,
        "status": "final",
        "code": {"coding": [{"system": "http://loinc.org", "code": "29463-7"}]},
        "subject": {"reference": subject},
        "valueQuantity": {
            "value": 185.0,
            "unit": "lbs",
            "system": "http://unitsofmeasure.org",
            "code": "[lb_av]"
        }
    })
}

#[tokio::test]
async fn crud_lifecycle_scenario() {
    let facade = facade();

    // Create: 201, version 1.
    let response = create(&facade, patient_example()).await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.etag.as_deref(), Some("W/\"1\""));
    assert_eq!(response.location.as_deref(), Some("Patient/example"));
    assert!(response.last_modified.is_some());
    assert!(response.outcome.is_some());

    // Read: 200, same version.
    let response = read(&facade, "Patient", "example").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.etag.as_deref(), Some("W/\"1\""));

    // Update a field: 200, version 2.
    let mut updated = patient_example();
    updated["gender"] = json!("female");
    let response = facade
        .dispatch(
            RoutedRequest::new(Interaction::InstanceUpdate(
                "Patient".to_string(),
                "example".to_string(),
            ))
            .with_body(updated.to_string()),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.etag.as_deref(), Some("W/\"2\""));

    // Conditional read of the current version short-circuits.
    let response = facade
        .dispatch(
            RoutedRequest::new(Interaction::InstanceRead(
                "Patient".to_string(),
                "example".to_string(),
            ))
            .with_if_none_match("W/\"2\""),
        )
        .await;
    assert_eq!(response.status, StatusCode::NOT_MODIFIED);
    assert!(response.resource.is_none());

    // Delete: 200.
    let response = facade
        .dispatch(RoutedRequest::new(Interaction::InstanceDelete(
            "Patient".to_string(),
            "example".to_string(),
        )))
        .await;
    assert_eq!(response.status, StatusCode::OK);

    // Subsequent read: 404, with a populated outcome.
    let response = read(&facade, "Patient", "example").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(response.outcome.is_some());
    assert!(!response.success);
}

#[tokio::test]
async fn version_monotonicity_over_many_updates() {
    let facade = facade();
    create(&facade, patient_example()).await;

    let mut last = None;
    for n in 2..=8u64 {
        let response = facade
            .dispatch(
                RoutedRequest::new(Interaction::InstanceUpdate(
                    "Patient".to_string(),
                    "example".to_string(),
                ))
                .with_body(patient_example().to_string()),
            )
            .await;
        last = response.etag.clone();
        assert_eq!(last.as_deref(), Some(format!("W/\"{n}\"").as_str()));
    }
    assert_eq!(last.as_deref(), Some("W/\"8\""));
}

#[tokio::test]
async fn create_with_live_id_fails() {
    let facade = facade();
    assert_eq!(create(&facade, patient_example()).await.status, StatusCode::CREATED);

    let response = create(&facade, patient_example()).await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert!(response.outcome.is_some());
}

#[tokio::test]
async fn recreate_after_delete_restarts_versioning() {
    let facade = facade();
    create(&facade, patient_example()).await;
    facade
        .dispatch(RoutedRequest::new(Interaction::InstanceDelete(
            "Patient".to_string(),
            "example".to_string(),
        )))
        .await;

    let response = create(&facade, patient_example()).await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.etag.as_deref(), Some("W/\"1\""));
}

#[tokio::test]
async fn payload_type_must_match_endpoint() {
    let facade = facade();
    let response = facade
        .dispatch(
            RoutedRequest::new(Interaction::TypeCreate("Observation".to_string()))
                .with_body(patient_example().to_string()),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn malformed_payloads() {
    let facade = facade();

    let response = facade
        .dispatch(
            RoutedRequest::new(Interaction::TypeCreate("Patient".to_string()))
                .with_body("{ not json")
                .with_content_type("application/fhir+json"),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.outcome.is_some());

    let response = facade
        .dispatch(
            RoutedRequest::new(Interaction::TypeCreate("Patient".to_string()))
                .with_body("<Patient/>")
                .with_content_type("application/fhir+xml"),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn conditional_create_matches() {
    let facade = facade();
    register_demo_parameters(&facade).await;
    create(&facade, patient_example()).await;

    // One match: returns the existing resource.
    let response = facade
        .dispatch(
            RoutedRequest::new(Interaction::TypeCreateConditional("Patient".to_string()))
                .with_query("_id=example")
                .with_body(patient_example().to_string()),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.location.as_deref(), Some("Patient/example"));

    // Zero matches: creates.
    let response = facade
        .dispatch(
            RoutedRequest::new(Interaction::TypeCreateConditional("Patient".to_string()))
                .with_query("_id=second")
                .with_body(json!({"resourceType": "Patient", "id": "second"}).to_string()),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED);

    // More than one match: precondition failed.
    let response = facade
        .dispatch(
            RoutedRequest::new(Interaction::TypeCreateConditional("Patient".to_string()))
                .with_query("_id:missing=false")
                .with_body(json!({"resourceType": "Patient"}).to_string()),
        )
        .await;
    assert_eq!(response.status, StatusCode::PRECONDITION_FAILED);
    assert!(response.outcome.is_some());
}

#[tokio::test]
async fn and_or_law() {
    let facade = facade();
    register_demo_parameters(&facade).await;
    create(&facade, patient_example()).await;
    create(
        &facade,
        json!({
            "resourceType": "Patient",
            "id": "second",
            "gender": "female",
            "name": [{"family": "Windsor", "given": ["Anne"]}]
        }),
    )
    .await;

    // AND across distinct parameter names.
    assert_eq!(search_total(&facade, "Patient", "_id=example&name=peter").await, 1);
    assert_eq!(search_total(&facade, "Patient", "_id=example&name=anne").await, 0);

    // OR across comma-separated values in one clause.
    assert_eq!(search_total(&facade, "Patient", "gender=male,female").await, 2);
    assert_eq!(search_total(&facade, "Patient", "name=peter,not-present").await, 1);
    assert_eq!(search_total(&facade, "Patient", "name=not-present,also-missing").await, 0);
}

#[tokio::test]
async fn string_modifiers_on_peter() {
    let facade = facade();
    register_demo_parameters(&facade).await;
    create(&facade, patient_example()).await;

    assert_eq!(search_total(&facade, "Patient", "name=Pet").await, 1);
    assert_eq!(search_total(&facade, "Patient", "name:exact=Peter").await, 1);
    assert_eq!(search_total(&facade, "Patient", "name:exact=peter").await, 0);
    assert_eq!(search_total(&facade, "Patient", "name:exact=Peterish").await, 0);
    assert_eq!(search_total(&facade, "Patient", "name:contains=eter").await, 1);
    assert_eq!(search_total(&facade, "Patient", "name:contains=zzrot").await, 0);
}

#[tokio::test]
async fn quantity_unit_equivalence() {
    let facade = facade();
    register_demo_parameters(&facade).await;
    create(&facade, patient_example()).await;
    create(&facade, weight_observation("weight", "Patient/example")).await;

    for query in [
        "value-quantity=185||lbs",
        "value-quantity=185||[lb_av]",
        "value-quantity=185|http://unitsofmeasure.org|[lb_av]",
        "value-quantity=185",
        "value-quantity=ge185||lbs",
    ] {
        assert_eq!(search_total(&facade, "Observation", query).await, 1, "query {query}");
    }
    for query in [
        "value-quantity=gt185||lbs",
        "value-quantity=186||[lb_av]",
        "value-quantity=185||furlong",
    ] {
        assert_eq!(search_total(&facade, "Observation", query).await, 0, "query {query}");
    }
}

#[tokio::test]
async fn composite_search() {
    let facade = facade();
    register_demo_parameters(&facade).await;
    create(&facade, weight_observation("weight", "Patient/example")).await;

    assert_eq!(
        search_total(
            &facade,
            "Observation",
            "code-value-quantity=http://loinc.org|29463-7$185||[lb_av]"
        )
        .await,
        1
    );
    assert_eq!(
        search_total(
            &facade,
            "Observation",
            "code-value-quantity=http://loinc.org|29463-7$200||[lb_av]"
        )
        .await,
        0
    );
}

#[tokio::test]
async fn profile_missing_partitions() {
    let facade = facade();
    register_demo_parameters(&facade).await;

    for i in 0..6 {
        let mut observation = weight_observation(&format!("obs-{i}"), "Patient/example");
        if i < 3 {
            observation["meta"] =
                json!({"profile": ["http://hl7.org/fhir/StructureDefinition/vitalsigns"]});
        }
        create(&facade, observation).await;
    }

    assert_eq!(search_total(&facade, "Observation", "_profile:missing=false").await, 3);
    assert_eq!(search_total(&facade, "Observation", "_profile:missing=true").await, 3);
    assert_eq!(
        search_total(
            &facade,
            "Observation",
            "_profile=http://hl7.org/fhir/StructureDefinition/vitalsigns"
        )
        .await,
        3
    );
}

#[tokio::test]
async fn chained_and_reverse_chained_search() {
    let facade = facade();
    register_demo_parameters(&facade).await;
    create(&facade, patient_example()).await;
    create(&facade, weight_observation("blood-pressure", "Patient/example")).await;

    assert_eq!(search_total(&facade, "Observation", "subject.name=peter").await, 1);
    assert_eq!(
        search_total(&facade, "Observation", "subject:Patient.name=peter").await,
        1
    );
    assert_eq!(search_total(&facade, "Observation", "subject._id=example").await, 1);
    assert_eq!(search_total(&facade, "Observation", "subject.name=zzrot").await, 0);

    assert_eq!(
        search_total(&facade, "Patient", "_has:Observation:patient:_id=blood-pressure").await,
        1
    );
    assert_eq!(
        search_total(&facade, "Patient", "_has:Observation:subject:_id=blood-pressure").await,
        1
    );
    assert_eq!(
        search_total(&facade, "Patient", "_has:Observation:patient:_id=nope").await,
        0
    );
}

#[tokio::test]
async fn includes_append_without_filtering() {
    let facade = facade();
    register_demo_parameters(&facade).await;
    create(&facade, patient_example()).await;
    create(&facade, weight_observation("obs-1", "Patient/example")).await;

    // Forward include.
    let bundle = search(&facade, "Observation", "_id=obs-1&_include=Observation:patient").await;
    assert_eq!(bundle["total"], 1);
    let entries = bundle["entry"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["search"]["mode"], "match");
    assert_eq!(entries[1]["search"]["mode"], "include");
    assert_eq!(entries[1]["resource"]["resourceType"], "Patient");

    // Reverse include.
    let bundle = search(&facade, "Patient", "_id=example&_revinclude=Observation:patient").await;
    assert_eq!(bundle["total"], 1);
    assert_eq!(bundle["entry"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn compartment_searches() {
    let facade = facade();
    register_demo_parameters(&facade).await;
    create(&facade, patient_example()).await;
    create(&facade, weight_observation("obs-1", "Patient/example")).await;
    create(&facade, weight_observation("obs-2", "Patient/other-patient")).await;

    let response = facade
        .dispatch(RoutedRequest::new(Interaction::CompartmentTypeSearch(
            "Patient".to_string(),
            "example".to_string(),
            "Observation".to_string(),
        )))
        .await;
    let bundle: Value = serde_json::from_str(response.resource.as_deref().unwrap()).unwrap();
    assert_eq!(bundle["total"], 1);

    let response = facade
        .dispatch(RoutedRequest::new(Interaction::CompartmentSearch(
            "Patient".to_string(),
            "example".to_string(),
        )))
        .await;
    let bundle: Value = serde_json::from_str(response.resource.as_deref().unwrap()).unwrap();
    // The patient itself plus its observation.
    assert_eq!(bundle["total"], 2);

    // Compartment of a missing instance.
    let response = facade
        .dispatch(RoutedRequest::new(Interaction::CompartmentSearch(
            "Patient".to_string(),
            "ghost".to_string(),
        )))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn authorization_narrows_searches() {
    let facade = facade();
    register_demo_parameters(&facade).await;
    create(&facade, patient_example()).await;
    create(&facade, weight_observation("obs-1", "Patient/example")).await;
    create(&facade, weight_observation("obs-2", "Patient/other-patient")).await;

    let auth = AuthorizationInfo::for_compartment("Patient/example");
    let response = facade
        .dispatch(
            RoutedRequest::new(Interaction::TypeSearch("Observation".to_string()))
                .with_authorization(auth),
        )
        .await;
    let bundle: Value = serde_json::from_str(response.resource.as_deref().unwrap()).unwrap();
    assert_eq!(bundle["total"], 1);

    // Without authorization the search is unrestricted.
    assert_eq!(search_total(&facade, "Observation", "").await, 2);
}

#[tokio::test]
async fn subscription_flow_with_dedup() {
    let facade = facade();

    // A topic whose two triggers both fire on one mutation.
    let response = create(
        &facade,
        json!({
            "resourceType": "SubscriptionTopic",
            "id": "encounter-complete",
            "url": "http://example.org/SubscriptionTopic/encounter-complete",
            "resourceTrigger": [
                {
                    "resource": "Encounter",
                    "supportedInteraction": ["create", "update"],
                    "fhirPathCriteria": "(%previous.empty() or (%previous.status != 'completed')) and (%current.status = 'completed')"
                },
                {
                    "resource": "Encounter",
                    "supportedInteraction": ["create", "update"],
                    "fhirPathCriteria": "%previous.empty() and %current.status = 'completed'"
                }
            ]
        }),
    )
    .await;
    assert_eq!(response.status, StatusCode::CREATED);

    let response = create(
        &facade,
        json!({
            "resourceType": "Subscription",
            "id": "sub-1",
            "status": "active",
            "topic": "http://example.org/SubscriptionTopic/encounter-complete",
            "channelType": {"code": "rest-hook"},
            "endpoint": "https://client.example.org/hook",
            "content": "full-resource"
        }),
    )
    .await;
    assert_eq!(response.status, StatusCode::CREATED);

    // One create, two firing triggers: exactly one event.
    create(
        &facade,
        json!({"resourceType": "Encounter", "id": "enc-1", "status": "completed"}),
    )
    .await;
    let engine = facade.subscription_engine();
    let subscription = engine.subscription("sub-1").unwrap();
    assert_eq!(subscription.events.len(), 1);
    assert_eq!(subscription.content_level, ContentLevel::FullResource);

    // Update planned -> completed fires; completed -> completed does not.
    create(
        &facade,
        json!({"resourceType": "Encounter", "id": "enc-2", "status": "planned"}),
    )
    .await;
    assert_eq!(engine.subscription("sub-1").unwrap().events.len(), 1);

    facade
        .dispatch(
            RoutedRequest::new(Interaction::InstanceUpdate(
                "Encounter".to_string(),
                "enc-2".to_string(),
            ))
            .with_body(
                json!({"resourceType": "Encounter", "id": "enc-2", "status": "completed"})
                    .to_string(),
            ),
        )
        .await;
    assert_eq!(engine.subscription("sub-1").unwrap().events.len(), 2);

    facade
        .dispatch(
            RoutedRequest::new(Interaction::InstanceUpdate(
                "Encounter".to_string(),
                "enc-2".to_string(),
            ))
            .with_body(
                json!({"resourceType": "Encounter", "id": "enc-2", "status": "completed"})
                    .to_string(),
            ),
        )
        .await;
    assert_eq!(engine.subscription("sub-1").unwrap().events.len(), 2);

    // Event numbers are strictly increasing.
    let numbers: Vec<u64> = engine
        .subscription("sub-1")
        .unwrap()
        .events
        .keys()
        .copied()
        .collect();
    assert_eq!(numbers, vec![1, 2]);
}

#[tokio::test]
async fn notification_content_levels() {
    let facade = facade();
    create(
        &facade,
        json!({
            "resourceType": "SubscriptionTopic",
            "id": "any-encounter",
            "url": "http://example.org/SubscriptionTopic/any-encounter",
            "resourceTrigger": [{"resource": "Encounter"}]
        }),
    )
    .await;
    create(
        &facade,
        json!({
            "resourceType": "Subscription",
            "id": "sub-1",
            "status": "active",
            "topic": "http://example.org/SubscriptionTopic/any-encounter",
            "content": "full-resource"
        }),
    )
    .await;
    create(
        &facade,
        json!({"resourceType": "Encounter", "id": "enc-1", "status": "completed"}),
    )
    .await;

    let engine = facade.subscription_engine();
    assert_eq!(engine.subscription("sub-1").unwrap().events.len(), 1);

    // full-resource: status entry plus exactly one entry per distinct
    // referenced resource.
    let bundle = engine
        .build_notification(
            "sub-1",
            &[],
            NotificationType::EventNotification,
            "http://localhost:5826/fhir",
            None,
        )
        .unwrap();
    assert_eq!(bundle["entry"].as_array().unwrap().len(), 2);

    // empty: no resource entries at all.
    let bundle = engine
        .build_notification(
            "sub-1",
            &[],
            NotificationType::EventNotification,
            "http://localhost:5826/fhir",
            Some(ContentLevel::Empty),
        )
        .unwrap();
    assert_eq!(bundle["entry"].as_array().unwrap().len(), 1);
    let event = &bundle["entry"][0]["resource"]["notificationEvent"][0];
    assert!(event.get("focus").is_none());
    assert!(event.get("eventNumber").is_some());
}

#[tokio::test]
async fn subscription_removal_stops_notifications() {
    let facade = facade();
    create(
        &facade,
        json!({
            "resourceType": "SubscriptionTopic",
            "id": "any-encounter",
            "url": "http://example.org/SubscriptionTopic/any-encounter",
            "resourceTrigger": [{"resource": "Encounter"}]
        }),
    )
    .await;
    create(
        &facade,
        json!({
            "resourceType": "Subscription",
            "id": "sub-1",
            "status": "active",
            "topic": "http://example.org/SubscriptionTopic/any-encounter"
        }),
    )
    .await;

    create(
        &facade,
        json!({"resourceType": "Encounter", "id": "enc-1", "status": "planned"}),
    )
    .await;
    assert_eq!(
        facade
            .subscription_engine()
            .subscription("sub-1")
            .unwrap()
            .events
            .len(),
        1
    );

    // Deleting the Subscription resource deregisters it in lock-step.
    facade
        .dispatch(RoutedRequest::new(Interaction::InstanceDelete(
            "Subscription".to_string(),
            "sub-1".to_string(),
        )))
        .await;
    assert!(facade.subscription_engine().subscription("sub-1").is_none());
}

#[tokio::test]
async fn search_parameter_lifecycle_follows_storage() {
    let facade = facade();
    register_demo_parameters(&facade).await;
    create(&facade, patient_example()).await;

    assert_eq!(search_total(&facade, "Patient", "name=peter").await, 1);

    // Updating the defining resource re-registers the parameter.
    facade
        .dispatch(
            RoutedRequest::new(Interaction::InstanceUpdate(
                "SearchParameter".to_string(),
                "Patient-name".to_string(),
            ))
            .with_body(
                json!({
                    "resourceType": "SearchParameter",
                    "id": "Patient-name",
                    "url": "http://hl7.org/fhir/SearchParameter/Patient-name",
                    "code": "name",
                    "type": "string",
                    "base": ["Patient"],
                    "expression": "Patient.name.family"
                })
                .to_string(),
            ),
        )
        .await;
    // Given-name matching no longer applies under the narrowed expression.
    assert_eq!(search_total(&facade, "Patient", "name=peter").await, 0);
    assert_eq!(search_total(&facade, "Patient", "name=chalmers").await, 1);

    // Deleting the defining resource removes the parameter: fail-closed.
    facade
        .dispatch(RoutedRequest::new(Interaction::InstanceDelete(
            "SearchParameter".to_string(),
            "Patient-name".to_string(),
        )))
        .await;
    assert_eq!(search_total(&facade, "Patient", "name=chalmers").await, 0);
}

#[tokio::test]
async fn unknown_parameter_fails_closed_in_search() {
    let facade = facade();
    create(&facade, patient_example()).await;
    assert_eq!(search_total(&facade, "Patient", "favorite-color=blue").await, 0);
    // Control parameters never filter.
    assert_eq!(search_total(&facade, "Patient", "_count=5").await, 1);
}

#[tokio::test]
async fn count_pages_entries_but_not_total() {
    let facade = facade();
    for i in 0..5 {
        create(
            &facade,
            json!({"resourceType": "Patient", "id": format!("p{i}")}),
        )
        .await;
    }

    let bundle = search(&facade, "Patient", "_count=2").await;
    assert_eq!(bundle["total"], 5);
    assert_eq!(bundle["entry"].as_array().unwrap().len(), 2);

    let bundle = search(&facade, "Patient", "_count=2&_offset=4").await;
    assert_eq!(bundle["entry"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn capabilities_lists_types_and_parameters() {
    let facade = facade();
    register_demo_parameters(&facade).await;

    let response = facade
        .dispatch(RoutedRequest::new(Interaction::SystemCapabilities))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let statement: Value =
        serde_json::from_str(response.resource.as_deref().unwrap()).unwrap();
    assert_eq!(statement["resourceType"], "CapabilityStatement");

    let resources = statement["rest"][0]["resource"].as_array().unwrap();
    let patient = resources
        .iter()
        .find(|r| r["type"] == "Patient")
        .expect("Patient capability entry");
    let params = patient["searchParam"].as_array().unwrap();
    assert!(params.iter().any(|p| p["name"] == "name"));
    assert!(params.iter().any(|p| p["name"] == "_id"));
}

#[tokio::test]
async fn system_search_spans_stores() {
    let facade = facade();
    register_demo_parameters(&facade).await;
    create(&facade, patient_example()).await;
    create(&facade, weight_observation("obs-1", "Patient/example")).await;

    let response = facade
        .dispatch(RoutedRequest::new(Interaction::SystemSearch).with_query("_id=example"))
        .await;
    let bundle: Value = serde_json::from_str(response.resource.as_deref().unwrap()).unwrap();
    assert_eq!(bundle["total"], 1);

    let response = facade
        .dispatch(RoutedRequest::new(Interaction::SystemSearch))
        .await;
    let bundle: Value = serde_json::from_str(response.resource.as_deref().unwrap()).unwrap();
    // Patient + observation + the seven registered SearchParameter resources.
    assert_eq!(bundle["total"], 9);
}

#[tokio::test]
async fn unimplemented_interactions_get_outcomes() {
    let facade = facade();
    let response = facade
        .dispatch(RoutedRequest::new(Interaction::InstanceReadHistory(
            "Patient".to_string(),
            "example".to_string(),
        )))
        .await;
    assert_eq!(response.status, StatusCode::NOT_IMPLEMENTED);
    assert!(response.outcome.is_some());
}

#[tokio::test]
async fn routing_composes_with_dispatch() {
    let facade = facade();
    create(&facade, patient_example()).await;

    let interaction = facade
        .route(Verb::Get, &["Patient", "example"], false)
        .expect("route");
    let response = facade.dispatch(RoutedRequest::new(interaction)).await;
    assert_eq!(response.status, StatusCode::OK);

    assert!(facade.route(Verb::Get, &["Widget", "x"], false).is_none());
    assert!(facade.route(Verb::Head, &["Patient"], false).is_none());
}
