use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub requests_created_total: IntCounter,
    pub offers_submitted_total: IntCounter,
    pub acceptances_total: IntCounterVec,
    pub trip_transitions_total: IntCounterVec,
    pub requests_expired_total: IntCounter,
    pub trips_completed_total: IntCounter,
    pub active_trips: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let requests_created_total = IntCounter::new(
            "requests_created_total",
            "Total delivery requests created",
        )
        .expect("valid requests_created_total metric");

        let offers_submitted_total = IntCounter::new(
            "offers_submitted_total",
            "Total courier offers submitted",
        )
        .expect("valid offers_submitted_total metric");

        let acceptances_total = IntCounterVec::new(
            Opts::new("acceptances_total", "Offer acceptance attempts by outcome"),
            &["outcome"],
        )
        .expect("valid acceptances_total metric");

        let trip_transitions_total = IntCounterVec::new(
            Opts::new("trip_transitions_total", "Trip transitions by new status"),
            &["status"],
        )
        .expect("valid trip_transitions_total metric");

        let requests_expired_total = IntCounter::new(
            "requests_expired_total",
            "Requests expired by the background sweep",
        )
        .expect("valid requests_expired_total metric");

        let trips_completed_total =
            IntCounter::new("trips_completed_total", "Trips that reached COMPLETED")
                .expect("valid trips_completed_total metric");

        let active_trips = IntGauge::new("active_trips", "Trips currently in flight")
            .expect("valid active_trips metric");

        registry
            .register(Box::new(requests_created_total.clone()))
            .expect("register requests_created_total");
        registry
            .register(Box::new(offers_submitted_total.clone()))
            .expect("register offers_submitted_total");
        registry
            .register(Box::new(acceptances_total.clone()))
            .expect("register acceptances_total");
        registry
            .register(Box::new(trip_transitions_total.clone()))
            .expect("register trip_transitions_total");
        registry
            .register(Box::new(requests_expired_total.clone()))
            .expect("register requests_expired_total");
        registry
            .register(Box::new(trips_completed_total.clone()))
            .expect("register trips_completed_total");
        registry
            .register(Box::new(active_trips.clone()))
            .expect("register active_trips");

        Self {
            registry,
            requests_created_total,
            offers_submitted_total,
            acceptances_total,
            trip_transitions_total,
            requests_expired_total,
            trips_completed_total,
            active_trips,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
