//! Property-based tests for scope nesting
//!
//! These tests drive arbitrary stacks of connection and transaction scopes
//! against the recording driver and check that:
//! - One physical connection is opened and closed per outermost scope
//! - The outermost transaction commits or rolls back exactly once
//! - The body's error reaches the caller unchanged
//! - The context is back to its empty state afterwards

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use transwarp::core::db::substitute_placeholders;
    use transwarp::test_utils::{Event, RecordingConnector};
    use transwarp::{args, DbError, ParamStyle, Result, ThreadContext};

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Scope {
        Connection,
        Transaction,
    }

    fn arb_scopes() -> impl Strategy<Value = Vec<Scope>> {
        prop::collection::vec(
            prop_oneof![Just(Scope::Connection), Just(Scope::Transaction)],
            0..6,
        )
    }

    /// Enters `scopes` from outermost to innermost, issues `statements`
    /// updates in the innermost one and fails there if asked to.
    fn run_nested(
        ctx: &mut ThreadContext,
        scopes: &[Scope],
        statements: usize,
        fail: bool,
    ) -> Result<()> {
        match scopes.split_first() {
            None => {
                for i in 0..statements {
                    ctx.execute("update users set visits=? where id=?", &args![i as i64, "u1"])?;
                }
                if fail {
                    Err(DbError::Query("boom".to_string()))
                } else {
                    Ok(())
                }
            }
            Some((Scope::Connection, rest)) => {
                ctx.with_connection(|ctx| run_nested(ctx, rest, statements, fail))
            }
            Some((Scope::Transaction, rest)) => {
                ctx.transaction(|ctx| run_nested(ctx, rest, statements, fail))
            }
        }
    }

    proptest! {
        #[test]
        fn prop_one_connection_per_outermost_scope(
            scopes in arb_scopes(),
            statements in 1usize..4,
            fail in any::<bool>(),
        ) {
            let recorder = RecordingConnector::new();
            let mut ctx = recorder.engine().context();

            let result = run_nested(&mut ctx, &scopes, statements, fail);

            prop_assert_eq!(recorder.connects(), 1);
            prop_assert_eq!(recorder.closes(), 1);
            prop_assert_eq!(ctx.transaction_depth(), 0);
            prop_assert!(!ctx.is_init());

            let in_transaction = scopes.contains(&Scope::Transaction);
            match (in_transaction, fail) {
                (true, true) => {
                    prop_assert_eq!(recorder.commits(), 0);
                    prop_assert_eq!(recorder.rollbacks(), 1);
                }
                (true, false) => {
                    prop_assert_eq!(recorder.commits(), 1);
                    prop_assert_eq!(recorder.rollbacks(), 0);
                }
                // Every statement commits on its own
                (false, _) => {
                    prop_assert_eq!(recorder.commits(), statements);
                    prop_assert_eq!(recorder.rollbacks(), 0);
                }
            }

            if fail {
                prop_assert!(matches!(result, Err(DbError::Query(ref msg)) if msg == "boom"));
            } else {
                prop_assert!(result.is_ok());
            }
        }

        #[test]
        fn prop_close_is_the_last_driver_event(scopes in arb_scopes(), fail in any::<bool>()) {
            let recorder = RecordingConnector::new();
            let mut ctx = recorder.engine().context();

            let _ = run_nested(&mut ctx, &scopes, 1, fail);

            let events = recorder.events();
            prop_assert_eq!(events.first().cloned(), Some(Event::Connect(1)));
            prop_assert_eq!(events.last().cloned(), Some(Event::Close(1)));
        }

        #[test]
        fn prop_scopes_without_statements_never_connect(
            scopes in arb_scopes(),
            fail in any::<bool>(),
        ) {
            let recorder = RecordingConnector::new();
            let mut ctx = recorder.engine().context();

            let _ = run_nested(&mut ctx, &scopes, 0, fail);

            prop_assert!(recorder.events().is_empty());
            prop_assert!(!ctx.is_init());
        }

        #[test]
        fn prop_every_placeholder_is_numbered(sql in "[a-z =?,]{0,40}") {
            let converted = substitute_placeholders(&sql, ParamStyle::Numbered);
            let count = sql.matches('?').count();
            prop_assert_eq!(converted.matches('?').count(), count);
            if count > 0 {
                let last = format!("?{}", count);
                prop_assert!(converted.contains(last.as_str()));
            }
            prop_assert_eq!(substitute_placeholders(&sql, ParamStyle::Qmark), sql.as_str());
        }
    }

    #[test]
    fn test_failing_statement_in_deep_nesting_rolls_back_once() {
        let recorder = RecordingConnector::new();
        recorder.fail_execute("delete");
        let mut ctx = recorder.engine().context();

        let result: Result<()> = ctx.transaction(|a| {
            a.with_connection(|b| {
                b.transaction(|c| {
                    c.execute("update users set admin=?", &args![0])?;
                    c.execute("delete from users", &[])?;
                    Ok(())
                })
            })
        });

        assert!(matches!(result, Err(DbError::Driver(_))));
        assert_eq!(recorder.rollbacks(), 1);
        assert_eq!(recorder.commits(), 0);
        assert_eq!(recorder.closes(), 1);
    }
}
