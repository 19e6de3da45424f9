//! Immutable hazard and weather snapshots.
//!
//! A refresh never touches a published field: it builds a new snapshot
//! and swaps the reference held by the channel. Searches that already
//! hold an `Arc` to the previous snapshot keep reading it unchanged.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;

use crate::router::hazard::HazardField;
use crate::router::weather::WeatherField;

/// A consistent pair of fields.
#[derive(Debug)]
pub struct FieldSnapshot {
    /// Incremented on every publication
    pub version: u64,
    /// Static hazards
    pub hazards: Arc<HazardField>,
    /// Weather forecast
    pub weather: Arc<WeatherField>,
    /// When this snapshot was published
    pub published_at: DateTime<Utc>,
}

/// Publishes field snapshots to any number of voyages.
#[derive(Debug)]
pub struct FieldPublisher {
    sender: watch::Sender<Arc<FieldSnapshot>>,
}

impl FieldPublisher {
    /// Creates a publisher holding version 0 of the fields.
    pub fn new(hazards: HazardField, weather: WeatherField) -> Self {
        let (sender, _) = watch::channel(Arc::new(FieldSnapshot {
            version: 0,
            hazards: Arc::new(hazards),
            weather: Arc::new(weather),
            published_at: Utc::now(),
        }));

        FieldPublisher { sender }
    }

    /// A receiver observing future publications.
    pub fn subscribe(&self) -> watch::Receiver<Arc<FieldSnapshot>> {
        self.sender.subscribe()
    }

    /// The snapshot currently published.
    pub fn current(&self) -> Arc<FieldSnapshot> {
        self.sender.borrow().clone()
    }

    /// Publish a new weather field alongside the current hazards.
    ///
    /// Returns the new snapshot version.
    pub fn publish_weather(&self, weather: WeatherField) -> u64 {
        self.publish(|current| (current.hazards.clone(), Arc::new(weather)))
    }

    /// Publish a new hazard field alongside the current weather.
    pub fn publish_hazards(&self, hazards: HazardField) -> u64 {
        self.publish(|current| (Arc::new(hazards), current.weather.clone()))
    }

    // the snapshot is rebuilt under the channel lock so concurrent
    // publications never drop each other's field
    fn publish<F>(&self, update: F) -> u64
    where
        F: FnOnce(&FieldSnapshot) -> (Arc<HazardField>, Arc<WeatherField>),
    {
        let mut version = 0;
        self.sender.send_modify(|current| {
            let (hazards, weather) = update(current);
            version = current.version + 1;
            *current = Arc::new(FieldSnapshot {
                version,
                hazards,
                weather,
                published_at: Utc::now(),
            });
        });

        tasks_info!("(publish) field snapshot {} published.", version);
        version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::hazard::{Coverage, HazardLayers};
    use crate::router::router_utils::geodesy::Sphere;
    use crate::test_util::{calm_weather, departure, land_block, wave_corridor_weather};
    use std::collections::BTreeSet;

    #[tokio::test]
    async fn test_publish_swaps_snapshot() {
        crate::get_log_handle().await;
        ut_info!("(test_publish_swaps_snapshot) start");

        let publisher = FieldPublisher::new(HazardField::default(), calm_weather(departure()));
        let mut receiver = publisher.subscribe();
        let before = publisher.current();
        assert_eq!(before.version, 0);

        let version = publisher.publish_weather(wave_corridor_weather(departure(), 6.0, 25.0));
        assert_eq!(version, 1);
        receiver.changed().await.unwrap();

        let after = receiver.borrow().clone();
        assert_eq!(after.version, 1);
        assert!(Arc::ptr_eq(&before.hazards, &after.hazards));
        assert!(!Arc::ptr_eq(&before.weather, &after.weather));

        // readers of the old snapshot are unaffected
        assert_eq!(before.version, 0);
        assert_eq!(publisher.publish_hazards(HazardField::default()), 2);

        ut_info!("(test_publish_swaps_snapshot) success");
    }

    #[test]
    fn test_concurrent_publishers_keep_both_fields() {
        let publisher = FieldPublisher::new(HazardField::default(), WeatherField::default());
        let rounds = 20;

        let (hazard_versions, weather_versions) = std::thread::scope(|scope| {
            let hazards = scope.spawn(|| {
                (0..rounds)
                    .map(|_| {
                        publisher.publish_hazards(HazardField::new(
                            HazardLayers {
                                layers: vec![land_block()],
                                coverage: Coverage::Worldwide,
                            },
                            &Sphere::default(),
                        ))
                    })
                    .collect::<Vec<u64>>()
            });
            let weather = scope.spawn(|| {
                (0..rounds)
                    .map(|_| publisher.publish_weather(calm_weather(departure())))
                    .collect::<Vec<u64>>()
            });
            (hazards.join().unwrap(), weather.join().unwrap())
        });

        let versions: BTreeSet<u64> = hazard_versions
            .into_iter()
            .chain(weather_versions)
            .collect();
        assert_eq!(versions, (1..=2 * rounds).collect::<BTreeSet<u64>>());

        let last = publisher.current();
        assert_eq!(last.version, 2 * rounds);
        assert_eq!(last.hazards.len(), 1);
        assert!(!last.weather.is_empty());
    }
}
