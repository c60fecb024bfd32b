//! Tests that are expected to raise.

use std::time::Duration;

use suitest::{Raise, Registry, ShouldThrow, TestError};

#[derive(Debug, thiserror::Error)]
#[error("quota exceeded: {used}/{limit}")]
pub struct QuotaError {
    used: u32,
    limit: u32,
}

#[derive(Default)]
pub struct Quotas;

fn reserve(used: u32, limit: u32) -> Result<u32, QuotaError> {
    if used > limit {
        return Err(QuotaError { used, limit });
    }
    Ok(limit - used)
}

pub fn register(registry: &mut Registry) {
    let mut suite = registry.suite::<Quotas>();

    suite
        .test("any error", |_, _| async {
            reserve(11, 10).raise()?;
            Ok(())
        })
        .should_throw(ShouldThrow::any());

    suite
        .test("message contains", |_, _| async {
            Err(TestError::thrown("connection refused by upstream"))
        })
        .should_throw(ShouldThrow::containing("refused"));

    suite
        .test("error kind", |_, _| async {
            reserve(3, 1).raise()?;
            Ok(())
        })
        .should_throw(ShouldThrow::kind::<QuotaError>());

    suite
        .test("predicate", |_, _| async {
            reserve(20, 10).raise()?;
            Ok(())
        })
        .should_throw(ShouldThrow::predicate(|error| {
            error.is_some_and(|e| e.to_string().contains("20/10"))
        }));

    suite
        .test("within quota", |_, ctx| async move {
            let left = reserve(4, 10).raise()?;
            ctx.equal(left, 6, "")
        })
        .timeout(Duration::from_secs(1));
}

suitest::source_unit!(register);
