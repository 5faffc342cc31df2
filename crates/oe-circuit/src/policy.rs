/// The four external dependencies each get their own independent breaker, because a
/// flaky quote feed shouldn't stop order placement and a rejected order shouldn't stop
/// position reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Orders,
    Quotes,
    Funds,
    Websocket,
}

impl Service {
    pub fn name(&self) -> &'static str {
        match self {
            Service::Orders => "orders",
            Service::Quotes => "quotes",
            Service::Funds => "funds",
            Service::Websocket => "websocket",
        }
    }

    pub fn policy(&self) -> Policy {
        match self {
            Service::Orders => Policy {
                failure_threshold: 3,
                cooldown_seconds: 30,
                half_open_success_threshold: 2,
            },
            Service::Quotes => Policy {
                failure_threshold: 5,
                cooldown_seconds: 60,
                half_open_success_threshold: 3,
            },
            Service::Funds => Policy {
                failure_threshold: 5,
                cooldown_seconds: 60,
                half_open_success_threshold: 2,
            },
            Service::Websocket => Policy {
                failure_threshold: 3,
                cooldown_seconds: 120,
                half_open_success_threshold: 1,
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Policy {
    pub failure_threshold: i32,
    pub cooldown_seconds: i64,
    pub half_open_success_threshold: i32,
}
