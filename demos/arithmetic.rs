//! Plain checks against a stateless suite.

use suitest::{Registry, check, check_eq, check_ne, check_throws};

#[derive(Default)]
pub struct Arithmetic;

pub fn register(registry: &mut Registry) {
    let mut suite = registry.suite::<Arithmetic>();

    suite.test("adds", |_, ctx| async move {
        check_eq!(ctx, 2 + 2, 4)?;
        check_ne!(ctx, 2 + 2, 5)?;
        Ok(())
    });

    suite.test("divides", |_, ctx| async move {
        let quotient = 17 / 5;
        check_eq!(ctx, quotient, 3, "integer division truncates")?;
        check!(ctx, 17 % 5 == 2)?;
        Ok(())
    });

    suite.test("rejects bad input", |_, ctx| async move {
        check_throws!(ctx, "seventeen".parse::<i32>())?;
        Ok(())
    });

    suite
        .test("checked overflow", |_, ctx| async move {
            check_eq!(ctx, i32::MAX.checked_add(1), None::<i32>)?;
            Ok(())
        })
        .description("checked_add reports overflow instead of wrapping");

    suite.test("not ready", |_, _| async { Ok(()) }).skip();
}

suitest::source_unit!(register);
