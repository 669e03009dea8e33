//! Declarative macros for ergonomic effect construction

/// Create an `Effect::Delay` that feeds an action back after a duration
///
/// # Example
///
/// ```rust,ignore
/// use busline_core::delay;
///
/// delay! {
///     duration: env.latency,
///     action: TicketAction::TicketCancelled { correlation_id, ticket_id }
/// }
/// ```
#[macro_export]
macro_rules! delay {
    (
        duration: $duration:expr,
        action: $action:expr
    ) => {
        $crate::effect::Effect::Delay {
            duration: $duration,
            action: ::std::boxed::Box::new($action),
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::effect::Effect;
    use std::time::Duration;

    #[test]
    fn delay_macro_builds_delay_effect() {
        let effect: Effect<u32> = delay! {
            duration: Duration::from_secs(1),
            action: 42
        };
        match effect {
            Effect::Delay { duration, action } => {
                assert_eq!(duration, Duration::from_secs(1));
                assert_eq!(*action, 42);
            },
            other => unreachable!("expected delay, got {other:?}"),
        }
    }
}
