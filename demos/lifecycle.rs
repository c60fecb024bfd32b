//! A suite instance shared by every hook and test.

use std::io::Write;
use std::sync::Mutex;

use suitest::{Registry, TestError, check_eq};

#[derive(Default)]
pub struct Inventory {
    items: Mutex<Vec<String>>,
    opened: Mutex<u32>,
}

impl Inventory {
    fn len(&self) -> usize {
        self.items.lock().map(|items| items.len()).unwrap_or_default()
    }
}

fn lock_error<T>(_: T) -> TestError {
    TestError::thrown("inventory lock poisoned")
}

pub fn register(registry: &mut Registry) {
    let mut suite = registry.suite::<Inventory>();

    suite.before_all(|inventory| async move {
        *inventory.opened.lock().map_err(lock_error)? += 1;
        Ok(())
    });

    suite.before_each(|inventory| async move {
        inventory
            .items
            .lock()
            .map_err(lock_error)?
            .push("apple".to_string());
        Ok(())
    });

    suite.test("starts with one item", |inventory, ctx| async move {
        ctx.out(format!("items: {}", inventory.len()));
        check_eq!(ctx, inventory.len(), 1usize)?;
        Ok(())
    });

    suite.test("keeps earlier items", |inventory, ctx| async move {
        writeln!(ctx.stderr(), "second run").map_err(TestError::raise)?;
        check_eq!(ctx, inventory.len(), 2usize)?;
        check_eq!(ctx, *inventory.opened.lock().map_err(lock_error)?, 1)?;
        Ok(())
    });

    suite.after_each(|inventory| async move {
        if inventory.len() > 10 {
            return Err(TestError::thrown("inventory overflow"));
        }
        Ok(())
    });

    suite.after_all(|inventory| async move {
        inventory.items.lock().map_err(lock_error)?.clear();
        Ok(())
    });
}

suitest::source_unit!(register);
