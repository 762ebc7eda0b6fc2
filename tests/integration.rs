use lsa_stm::{Stm, TxState};

#[test]
fn test_basic_transaction() {
    let stm = Stm::new();
    let var = stm.object(1);
    var.store(0, 10u64);

    let result = stm.atomically(0, |tx| {
        let val: u64 = tx.read(&var, 0)?;
        tx.write(&var, val + 5, 0)?;
        Ok(val)
    });

    assert_eq!(result, 10);
    assert_eq!(var.load::<u64>(0), 15);
}

#[test]
fn test_read_your_own_writes() {
    let stm = Stm::new();
    let var = stm.object(1);
    var.store(0, 10u64);

    stm.atomically(0, |tx| {
        let val1: u64 = tx.read(&var, 0)?;
        assert_eq!(val1, 10);

        tx.write(&var, 20u64, 0)?;
        let val2: u64 = tx.read(&var, 0)?;
        assert_eq!(val2, 20); // Should see the uncommitted write

        tx.write(&var, 30u64, 0)?;
        let val3: u64 = tx.read(&var, 0)?;
        assert_eq!(val3, 30);
        Ok(())
    });

    assert_eq!(var.load::<u64>(0), 30);
}

#[test]
fn test_write_coalescing_last_wins() {
    let stm = Stm::new();
    let var = stm.object(1);

    let mut tx = stm.transaction();
    tx.begin(0);
    tx.write(&var, 1u64, 0).unwrap();
    tx.write(&var, 2u64, 0).unwrap();
    assert!(tx.commit());

    assert_eq!(var.load::<u64>(0), 2);
    // Two writes to one location are one writing commit: one clock tick.
    assert_eq!(stm.clock(), 1);
}

#[test]
fn test_multiple_fields_atomic_transfer() {
    let stm = Stm::new();
    let accounts = stm.object(2);
    accounts.store(0, 100u64);

    stm.atomically(0, |tx| {
        let from: u64 = tx.read(&accounts, 0)?;
        let to: u64 = tx.read(&accounts, 1)?;
        tx.write(&accounts, from - 50, 0)?;
        tx.write(&accounts, to + 50, 1)?;
        Ok(())
    });

    assert_eq!(accounts.load::<u64>(0), 50);
    assert_eq!(accounts.load::<u64>(1), 50);
}

#[test]
fn test_counter_advances_clock_exactly() {
    let stm = Stm::new();
    let counter = stm.object(1);

    for _ in 0..1000 {
        stm.atomically(0, |tx| {
            let n: u64 = tx.read(&counter, 0)?;
            tx.write(&counter, n + 1, 0)
        });
    }

    assert_eq!(counter.load::<u64>(0), 1000);
    // Uncontended: every commit is a writing commit and nothing else ticks
    // the clock.
    assert_eq!(stm.clock(), 1000);
}

#[test]
fn test_read_only_commit_leaves_clock() {
    let stm = Stm::new();
    let var = stm.object(1);
    var.store(0, 42u64);

    let v = stm.atomically(0, |tx| tx.read::<u64>(&var, 0));
    assert_eq!(v, 42);
    assert_eq!(stm.clock(), 0);

    let mut tx = stm.transaction();
    tx.begin(0);
    let _: u64 = tx.read(&var, 0).unwrap();
    assert!(tx.commit());
    assert_eq!(stm.clock(), 0);
}

#[test]
fn test_paired_read_echoes_program_value() {
    let stm = Stm::new();
    let var = stm.object(1);
    var.store(0, 7u64);

    let mut tx = stm.transaction();
    tx.begin(0);
    tx.before_read_access(&var, 0).unwrap();
    // The instrumented caller reads the field itself between the two halves.
    let seen: u64 = var.load(0);
    let value: u64 = tx.add_read_access(&var, seen, 0).unwrap();
    assert_eq!(value, 7);
    assert!(tx.commit());
}

#[test]
fn test_fresh_engine_reads_version_zero() {
    let stm = Stm::new();
    let a = stm.object(3);
    let b = stm.object(1);

    // startTime is 0 and every slot carries version 0: all readable.
    let mut tx = stm.transaction();
    tx.begin(0);
    for offset in 0..3 {
        assert_eq!(tx.read::<u64>(&a, offset).unwrap(), 0);
    }
    assert_eq!(tx.read::<u64>(&b, 0).unwrap(), 0);
    assert!(tx.commit());
}

#[test]
fn test_rollback_annihilates_effects() {
    let stm = Stm::new();
    let var = stm.object(1);
    var.store(0, 5u64);

    let mut tx = stm.transaction();
    tx.begin(0);
    tx.write(&var, 99u64, 0).unwrap();
    tx.rollback();

    assert_eq!(var.load::<u64>(0), 5);
    assert_eq!(stm.clock(), 0);

    // The lock table is as if the transaction never ran: another handle can
    // read and write the location freely.
    let mut other = stm.transaction();
    other.begin(0);
    let v: u64 = other.read(&var, 0).unwrap();
    assert_eq!(v, 5);
    other.write(&var, v + 1, 0).unwrap();
    assert!(other.commit());
    assert_eq!(var.load::<u64>(0), 6);
}

#[test]
fn test_state_transitions() {
    let stm = Stm::new();
    let var = stm.object(1);

    let mut tx = stm.transaction();
    assert_eq!(tx.state(), TxState::Idle);

    tx.begin(0);
    assert_eq!(tx.state(), TxState::Active);
    let _: u64 = tx.read(&var, 0).unwrap();
    assert!(tx.commit());
    assert_eq!(tx.state(), TxState::Committed);

    tx.begin(0);
    tx.write(&var, 1u64, 0).unwrap();
    tx.rollback();
    assert_eq!(tx.state(), TxState::Aborted);
}

#[test]
fn test_typed_values_survive_commit() {
    let stm = Stm::new();
    let obj = stm.object(5);

    stm.atomically(0, |tx| {
        tx.write(&obj, -40i64, 0)?;
        tx.write(&obj, true, 1)?;
        tx.write(&obj, 'x', 2)?;
        tx.write(&obj, 2.5f64, 3)?;
        tx.write(&obj, -1i8, 4)?;
        Ok(())
    });

    assert_eq!(obj.load::<i64>(0), -40);
    assert_eq!(obj.load::<bool>(1), true);
    assert_eq!(obj.load::<char>(2), 'x');
    assert_eq!(obj.load::<f64>(3), 2.5);
    assert_eq!(obj.load::<i8>(4), -1);
}

#[test]
fn test_transaction_return_value() {
    let stm = Stm::new();
    let var = stm.object(1);
    var.store(0, 10u64);

    let result = stm.atomically(0, |tx| {
        let v: u64 = tx.read(&var, 0)?;
        tx.write(&var, v * 2, 0)?;
        Ok(v)
    });

    assert_eq!(result, 10);
    assert_eq!(var.load::<u64>(0), 20);
}
