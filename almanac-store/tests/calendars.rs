use chrono::{TimeZone, Utc};

use almanac_collections::types::*;
use almanac_collections::{
    CalendarBackend, Error, NotificationSupport, SchedulingSupport, SharingSupport,
    SubscriptionSupport, UidResolver,
};
use almanac_ical::filter::*;
use almanac_ical::Classification;
use almanac_store::{ReferenceStore, StoreConfig};

mod common;
use crate::common::*;

#[tokio::test]
async fn object_round_trip_and_etags() {
    let store = store();
    let home = calendar(&store, ALICE, "home").await;

    let data = event("meeting", "20240102T100000Z");
    let etag = store
        .create_calendar_object(&home, "meeting.ics", data.clone())
        .await
        .unwrap()
        .expect("the store computes etags");
    assert_eq!(etag, Etag::from_data(&data));

    let obj = store
        .get_calendar_object(&home, "meeting.ics")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(obj.calendar_data.as_deref(), Some(&data[..]));
    assert_eq!(obj.etag.as_ref(), Some(&etag));
    assert_eq!(obj.size, data.len() as u64);
    assert_eq!(obj.component, Some(Component::VEvent));

    // same content, same etag
    let same = store
        .update_calendar_object(&home, "meeting.ics", data.clone())
        .await
        .unwrap();
    assert_eq!(same, Some(etag.clone()));

    let moved = event("meeting", "20240103T100000Z");
    let changed = store
        .update_calendar_object(&home, "meeting.ics", moved.clone())
        .await
        .unwrap()
        .unwrap();
    assert_ne!(changed, etag);

    let listed = store.get_calendar_objects(&home).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].calendar_data.is_none());
    assert_eq!(listed[0].etag.as_ref(), Some(&changed));

    let multi = store
        .get_multiple_calendar_objects(&home, &["missing.ics".into(), "meeting.ics".into()])
        .await
        .unwrap();
    assert_eq!(multi.len(), 1);
    assert_eq!(multi[0].calendar_data.as_deref(), Some(&moved[..]));

    assert!(matches!(
        store
            .create_calendar_object(&home, "meeting.ics", data.clone())
            .await,
        Err(Error::Conflict(_))
    ));
    assert!(matches!(
        store
            .update_calendar_object(&home, "other.ics", data.clone())
            .await,
        Err(Error::NotFound(_))
    ));

    store
        .delete_calendar_object(&home, "meeting.ics")
        .await
        .unwrap();
    assert!(store
        .get_calendar_object(&home, "meeting.ics")
        .await
        .unwrap()
        .is_none());
    assert!(matches!(
        store.delete_calendar_object(&home, "meeting.ics").await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn malformed_objects_are_refused() {
    let store = store();
    let home = calendar(&store, ALICE, "home").await;
    let events = store
        .create_calendar(
            ALICE,
            "events",
            CalendarProperties {
                supported_components: vec![Component::VEvent],
                ..CalendarProperties::default()
            },
        )
        .await
        .unwrap();

    for data in [
        b"hello".to_vec(),
        vec![0xff, 0xfe, 0x00],
        b"BEGIN:VCALENDAR\r\nVERSION:2.0\r\nEND:VCALENDAR\r\n".to_vec(),
    ] {
        assert!(matches!(
            store.create_calendar_object(&home, "bad.ics", data).await,
            Err(Error::MalformedObject(_))
        ));
    }

    assert!(matches!(
        store.create_calendar_object(&events, "task.ics", todo("t")).await,
        Err(Error::MalformedObject(_))
    ));
    store
        .create_calendar_object(&home, "task.ics", todo("t"))
        .await
        .unwrap();
    assert_eq!(uris(&store, &home).await, vec!["task.ics".to_string()]);
    assert!(uris(&store, &events).await.is_empty());
}

#[tokio::test]
async fn calendar_lifecycle() {
    let store = store();
    let home = calendar(&store, ALICE, "home").await;
    calendar(&store, BOB, "home").await;

    assert!(matches!(
        store
            .create_calendar(ALICE, "home", CalendarProperties::default())
            .await,
        Err(Error::Conflict(_))
    ));

    let cals = store.get_calendars_for_user(ALICE).await.unwrap();
    assert_eq!(cals.len(), 1);
    let cal = &cals[0];
    assert_eq!(cal.id, home);
    assert_eq!(cal.uri, "home");
    assert!(cal.is_owned_by(ALICE));
    assert_eq!(cal.properties.display_name.as_deref(), Some("home"));
    assert_eq!(
        cal.properties.supported_components,
        vec![Component::VEvent, Component::VTodo]
    );
    assert_eq!(cal.share.as_ref().map(|s| s.access), Some(ShareAccess::NotShared));

    store
        .update_calendar(
            &home,
            CalendarPatch {
                display_name: Some(Some("Home".into())),
                color: Some(Some("#ff0000".into())),
                ..CalendarPatch::default()
            },
        )
        .await
        .unwrap();
    let cals = store.get_calendars_for_user(ALICE).await.unwrap();
    assert_eq!(cals[0].properties.display_name.as_deref(), Some("Home"));
    assert_eq!(cals[0].properties.color.as_deref(), Some("#ff0000"));
    assert_ne!(cals[0].sync_token, cal.sync_token);

    store.delete_calendar(&home).await.unwrap();
    assert!(store.get_calendars_for_user(ALICE).await.unwrap().is_empty());
    assert_eq!(store.get_calendars_for_user(BOB).await.unwrap().len(), 1);
    assert!(matches!(
        store.get_calendar_objects(&home).await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        store
            .create_calendar_object(&home, "a.ics", event("a", "20240102T100000Z"))
            .await,
        Err(Error::NotFound(_))
    ));

    // the uri can be reused once the calendar is gone
    calendar(&store, ALICE, "home").await;
}

#[tokio::test]
async fn query_by_component_and_time_range() {
    let store = store();
    let home = calendar(&store, ALICE, "home").await;
    store
        .create_calendar_object(&home, "jan.ics", event("jan", "20240102T100000Z"))
        .await
        .unwrap();
    store
        .create_calendar_object(&home, "mar.ics", event("mar", "20240301T100000Z"))
        .await
        .unwrap();
    store
        .create_calendar_object(
            &home,
            "daily.ics",
            event_with("daily", "20231201T090000Z", "RRULE:FREQ=DAILY\r\n"),
        )
        .await
        .unwrap();
    store
        .create_calendar_object(&home, "task.ics", todo("task"))
        .await
        .unwrap();

    let all = store.calendar_query(&home, &Filter::all()).await.unwrap();
    assert_eq!(all.len(), 4);

    let tasks = store
        .calendar_query(&home, &Filter::component(Component::VTodo))
        .await
        .unwrap();
    assert_eq!(tasks, vec!["task.ics".to_string()]);

    let march = Filter::inner(CompFilter {
        name: Component::VEvent,
        additional_rules: Some(CompFilterRules::Matches(CompFilterMatch {
            time_range: Some(TimeRange::FullRange(
                Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap(),
            )),
            prop_filter: vec![],
            comp_filter: vec![],
        })),
    });
    let found = store.calendar_query(&home, &march).await.unwrap();
    assert_eq!(found, vec!["daily.ics".to_string(), "mar.ics".to_string()]);

    let summary = Filter::inner(CompFilter {
        name: Component::VEvent,
        additional_rules: Some(CompFilterRules::Matches(CompFilterMatch {
            time_range: None,
            prop_filter: vec![PropFilter {
                name: "UID".into(),
                additional_rules: Some(PropFilterRules::Match(PropFilterMatch {
                    time_or_text: Some(TimeOrText::Text(TextMatch::new("JAN"))),
                    param_filter: vec![],
                })),
            }],
            comp_filter: vec![],
        })),
    });
    let found = store.calendar_query(&home, &summary).await.unwrap();
    assert_eq!(found, vec!["jan.ics".to_string()]);
}

#[tokio::test]
async fn calendars_by_uri_and_id() {
    let store = store();
    let home = calendar(&store, ALICE, "home").await;
    calendar(&store, BOB, "home").await;

    let found = store.get_calendar_by_uri(ALICE, "home").await.unwrap().unwrap();
    assert_eq!(found.id, home);
    assert_eq!(found.principal_uri, ALICE);
    assert!(store.get_calendar_by_uri(ALICE, "work").await.unwrap().is_none());

    let by_id = store.get_calendar_by_id(&home).await.unwrap().unwrap();
    assert_eq!(by_id, found);
    assert!(store
        .get_calendar_by_id(&CalendarId::from("not-an-id"))
        .await
        .unwrap()
        .is_none());

    store.delete_calendar(&home).await.unwrap();
    assert!(store.get_calendar_by_id(&home).await.unwrap().is_none());
    assert!(store.get_calendar_by_uri(ALICE, "home").await.unwrap().is_none());
}

#[tokio::test]
async fn objects_carry_their_classification() {
    let store = store();
    let home = calendar(&store, ALICE, "home").await;
    store
        .create_calendar_object(&home, "open.ics", event("open", "20240102T100000Z"))
        .await
        .unwrap();
    store
        .create_calendar_object(
            &home,
            "secret.ics",
            event_with("secret", "20240102T100000Z", "CLASS:CONFIDENTIAL\r\n"),
        )
        .await
        .unwrap();

    let class_of = |uri: &'static str| {
        let store = &store;
        let home = &home;
        async move {
            store
                .get_calendar_object(home, uri)
                .await
                .unwrap()
                .unwrap()
                .classification
        }
    };
    assert_eq!(class_of("open.ics").await, Some(Classification::Public));
    assert_eq!(class_of("secret.ics").await, Some(Classification::Confidential));

    store
        .update_calendar_object(
            &home,
            "secret.ics",
            event_with("secret", "20240102T100000Z", "CLASS:PRIVATE\r\n"),
        )
        .await
        .unwrap();
    assert_eq!(class_of("secret.ics").await, Some(Classification::Private));

    let listed: Vec<_> = store
        .get_calendar_objects(&home)
        .await
        .unwrap()
        .into_iter()
        .map(|obj| (obj.uri, obj.classification))
        .collect();
    assert_eq!(
        listed,
        vec![
            ("open.ics".to_string(), Some(Classification::Public)),
            ("secret.ics".to_string(), Some(Classification::Private)),
        ]
    );
}

#[tokio::test]
async fn endless_events_do_not_break_queries() {
    let store = store();
    let home = calendar(&store, ALICE, "home").await;
    let long = "BEGIN:VCALENDAR\r\n\
                VERSION:2.0\r\n\
                BEGIN:VEVENT\r\n\
                UID:long\r\n\
                DTSTART:20240101T100000Z\r\n\
                DURATION:P100000000D\r\n\
                END:VEVENT\r\n\
                END:VCALENDAR\r\n";
    store
        .create_calendar_object(&home, "long.ics", long.as_bytes().to_vec())
        .await
        .unwrap();
    store
        .create_calendar_object(&home, "jan.ics", event("jan", "20240102T100000Z"))
        .await
        .unwrap();

    let march = Filter::inner(CompFilter {
        name: Component::VEvent,
        additional_rules: Some(CompFilterRules::Matches(CompFilterMatch {
            time_range: Some(TimeRange::FullRange(
                Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap(),
            )),
            prop_filter: vec![],
            comp_filter: vec![],
        })),
    });
    let found = store.calendar_query(&home, &march).await.unwrap();
    assert_eq!(found, vec!["long.ics".to_string()]);

    let scanned = almanac_collections::QueryEngine::new(&store)
        .run(&home, &march)
        .await
        .unwrap();
    assert_eq!(scanned, found);
}

#[tokio::test]
async fn uid_lookup_stays_in_owned_calendars() {
    let store = store();
    let home = calendar(&store, ALICE, "home").await;
    let work = calendar(&store, ALICE, "work").await;
    let bob_home = calendar(&store, BOB, "home").await;

    store
        .create_calendar_object(&home, "a.ics", event("meeting-10", "20240102T100000Z"))
        .await
        .unwrap();
    store
        .create_calendar_object(&work, "b.ics", event("meeting-1", "20240102T100000Z"))
        .await
        .unwrap();
    store
        .create_calendar_object(&work, "t.ics", todo("task-1"))
        .await
        .unwrap();

    // bob gets access to alice's work calendar
    store
        .update_invites(
            &work,
            vec![ShareInvite::new("mailto:bob@example.com", Some(BOB.into()), ShareAccess::Read)],
        )
        .await
        .unwrap();
    let resource = store.get_calendars_for_user(ALICE).await.unwrap()[1]
        .share
        .clone()
        .unwrap()
        .resource_uri;
    store
        .share_reply(
            "mailto:bob@example.com",
            InviteStatus::Accepted,
            &resource,
            "invite-1",
            None,
        )
        .await
        .unwrap();

    let shared = &store;
    let lookup = move |principal: &'static str, uid: &'static str| {
        let store = shared;
        async move {
            let indexed = store.get_calendar_object_by_uid(principal, uid).await.unwrap();
            let scanned = UidResolver::new(store).resolve(principal, uid).await.unwrap();
            assert_eq!(indexed, scanned, "index and scan disagree on {}", uid);
            indexed
        }
    };

    assert_eq!(lookup(ALICE, "meeting-1").await.as_deref(), Some("work/b.ics"));
    assert_eq!(lookup(ALICE, "meeting-10").await.as_deref(), Some("home/a.ics"));
    assert_eq!(lookup(ALICE, "meeting").await, None);
    assert_eq!(lookup(BOB, "meeting-1").await, None);

    // the index covers every component, the scan only events
    assert_eq!(
        store
            .get_calendar_object_by_uid(ALICE, "task-1")
            .await
            .unwrap()
            .as_deref(),
        Some("work/t.ics")
    );

    store
        .create_calendar_object(&bob_home, "c.ics", event("meeting-1", "20240102T100000Z"))
        .await
        .unwrap();
    assert_eq!(lookup(BOB, "meeting-1").await.as_deref(), Some("home/c.ics"));
}

#[tokio::test]
async fn snapshot_round_trip() {
    let path = std::env::temp_dir().join(format!("almanac-store-{}.snapshot", std::process::id()));
    let config = StoreConfig::default();

    let empty = ReferenceStore::load(config.clone(), &path).await.unwrap();
    assert!(empty.get_calendars_for_user(ALICE).await.unwrap().is_empty());

    let store = store();
    let home = calendar(&store, ALICE, "home").await;
    store
        .create_calendar_object(&home, "a.ics", event("a", "20240102T100000Z"))
        .await
        .unwrap();
    store
        .update_calendar(
            &home,
            CalendarPatch {
                description: Some(Some("family".into())),
                ..CalendarPatch::default()
            },
        )
        .await
        .unwrap();
    store
        .update_invites(
            &home,
            vec![ShareInvite::new("mailto:bob@example.com", Some(BOB.into()), ShareAccess::ReadWrite)],
        )
        .await
        .unwrap();
    store
        .create_scheduling_object(ALICE, "req.ics", event("req", "20240105T100000Z"))
        .await
        .unwrap();
    store
        .create_subscription(
            ALICE,
            "holidays",
            SubscriptionProperties {
                source: "https://example.com/holidays.ics".into(),
                ..SubscriptionProperties::default()
            },
        )
        .await
        .unwrap();
    let before = changes(&store, &home, None, None).await.unwrap();

    store.save(&path).await.unwrap();
    let loaded = ReferenceStore::load(config, &path).await.unwrap();
    let _ = std::fs::remove_file(&path);

    let cals = loaded.get_calendars_for_user(ALICE).await.unwrap();
    assert_eq!(cals, store.get_calendars_for_user(ALICE).await.unwrap());
    assert_eq!(cals[0].properties.description.as_deref(), Some("family"));

    let obj = loaded.get_calendar_object(&home, "a.ics").await.unwrap().unwrap();
    assert_eq!(obj.etag, Some(Etag::from_data(&event("a", "20240102T100000Z"))));
    assert_eq!(
        loaded.get_calendar_object_by_uid(ALICE, "a").await.unwrap().as_deref(),
        Some("home/a.ics")
    );

    // sync continues from tokens issued before the snapshot
    let after = changes(&loaded, &home, None, None).await.unwrap();
    assert_eq!(after, before);
    loaded
        .delete_calendar_object(&home, "a.ics")
        .await
        .unwrap();
    let diff = changes(&loaded, &home, Some(&before.sync_token), None)
        .await
        .unwrap();
    assert_eq!(diff.deleted, vec!["a.ics".to_string()]);

    assert_eq!(loaded.get_invites(&home).await.unwrap().len(), 1);
    assert_eq!(
        loaded.get_notifications_for_principal(BOB).await.unwrap(),
        store.get_notifications_for_principal(BOB).await.unwrap()
    );
    assert_eq!(loaded.get_scheduling_objects(ALICE).await.unwrap().len(), 1);
    assert_eq!(loaded.get_subscriptions_for_user(ALICE).await.unwrap().len(), 1);
}
