mod common;

use common::{message, Harness};
use feed_alarm::alert::ALARM_REPEATS;
use feed_alarm::db::{AlertRepository, ALERT_KEY};
use feed_alarm::models::{NotificationEvent, Urgency};

fn event(time: i64, text: &str, priority: Option<i64>) -> NotificationEvent {
    NotificationEvent::from_line(&message(time, text, priority)).unwrap()
}

mod transitions {
    use super::*;

    #[test]
    fn starts_idle_without_marker() {
        let h = Harness::new();
        let alert = h.alert();
        assert!(!alert.is_active());
        assert!(h.health.statuses().is_empty());
    }

    #[test]
    fn enable_is_idempotent() {
        let h = Harness::new();
        let alert = h.alert();

        alert.enable().unwrap();
        let once = (alert.status(), h.store.get(ALERT_KEY).unwrap());
        alert.enable().unwrap();
        let twice = (alert.status(), h.store.get(ALERT_KEY).unwrap());

        assert_eq!(once, twice);
        assert!(alert.is_active());
        assert_eq!(twice.1, Some("True".to_string()));
    }

    #[test]
    fn disable_is_idempotent_and_clears_marker() {
        let h = Harness::new();
        let alert = h.alert();

        alert.disable().unwrap();
        assert!(!alert.is_active());

        alert.enable().unwrap();
        alert.disable().unwrap();
        alert.disable().unwrap();
        assert!(!alert.is_active());
        assert!(!h.store.load_alert().unwrap());
    }

    #[test]
    fn latest_message_overwrites() {
        let h = Harness::new();
        let alert = h.alert();

        alert.raise(&event(1, "first", Some(5))).unwrap();
        alert.raise(&event(2, "second", Some(5))).unwrap();

        let status = alert.status();
        assert!(status.active);
        assert_eq!(status.message, "second");
        assert_eq!(status.urgency, Urgency::Critical);
    }

    #[test]
    fn alarming_iff_qualifying_message_since_last_disable() {
        // (priority, disable before this message)
        let sequences: Vec<Vec<(Option<i64>, bool)>> = vec![
            vec![(Some(1), false), (Some(3), false), (None, false)],
            vec![(Some(4), false), (Some(5), false), (Some(2), false)],
            vec![(Some(5), false), (Some(3), true)],
            vec![(Some(5), false), (Some(1), true), (Some(5), false), (Some(4), false)],
        ];

        for sequence in sequences {
            let h = Harness::new();
            let alert = h.alert();
            let mut expected = false;

            for (i, (priority, disable_first)) in sequence.iter().enumerate() {
                if *disable_first {
                    alert.disable().unwrap();
                    expected = false;
                }
                let e = event(i as i64, "msg", *priority);
                if e.raises_alarm() {
                    alert.raise(&e).unwrap();
                    expected = true;
                }
            }

            assert_eq!(alert.is_active(), expected, "sequence {:?}", sequence);
            assert_eq!(h.store.load_alert().unwrap(), expected);
        }
    }
}

mod recovery {
    use super::*;

    #[test]
    fn durable_marker_restores_alarm_and_reports_once() {
        let h = Harness::new();
        h.store.save_alert(true).unwrap();

        let alert = h.alert();

        assert!(alert.is_active());
        assert_eq!(h.health.statuses(), vec!["Existing alert file found"]);
    }

    #[test]
    fn stray_sentinel_is_removed_without_silencing() {
        let h = Harness::new();
        h.store.save_alert(true).unwrap();
        std::fs::write(h.paths.sentinel(), b"").unwrap();

        let alert = h.alert();

        assert!(!h.paths.sentinel().exists());
        assert!(alert.is_active());
    }
}

mod run_alert {
    use super::*;

    #[tokio::test]
    async fn does_nothing_when_idle() {
        let h = Harness::new();
        let alert = h.alert();

        alert.run_alert(true).await.unwrap();

        assert_eq!(h.effects.plays(), 0);
        assert!(h.effects.notifications().is_empty());
        assert_eq!(h.message_log(), "");
    }

    #[tokio::test]
    async fn new_notification_plays_shows_and_logs_sanitized_text() {
        let h = Harness::new();
        let alert = h.alert();

        alert.raise(&event(1, "Hi! <script>", Some(5))).unwrap();
        alert.run_alert(true).await.unwrap();

        assert_eq!(h.effects.plays(), ALARM_REPEATS);
        assert_eq!(
            h.effects.notifications(),
            vec![("CheckMessage".to_string(), Urgency::Critical, "Hi script".to_string())]
        );
        assert_eq!(h.message_log(), "Hi script\n");
        // Raw text is kept; only the boundary output is sanitized
        assert_eq!(alert.status().message, "Hi! <script>");
    }

    #[tokio::test]
    async fn standing_alarm_only_plays() {
        let h = Harness::new();
        let alert = h.alert();
        alert.raise(&event(1, "leak", Some(5))).unwrap();

        alert.run_alert(false).await.unwrap();

        assert_eq!(h.effects.plays(), ALARM_REPEATS);
        assert!(h.effects.notifications().is_empty());
        assert_eq!(h.message_log(), "");
    }

    #[tokio::test]
    async fn message_log_is_appended() {
        let h = Harness::new();
        let alert = h.alert();

        alert.raise(&event(1, "first.", Some(5))).unwrap();
        alert.run_alert(true).await.unwrap();
        alert.raise(&event(2, "second", Some(5))).unwrap();
        alert.run_alert(true).await.unwrap();

        assert_eq!(h.message_log(), "first.\nsecond\n");
    }

    #[tokio::test]
    async fn disable_between_repeats_cuts_playback_short() {
        let h = Harness::new();
        let alert = h.alert();
        alert.enable().unwrap();
        h.effects.silence_after(2, &alert);

        alert.run_alert(false).await.unwrap();

        assert_eq!(h.effects.plays(), 2);
        assert!(!alert.is_active());
    }
}
