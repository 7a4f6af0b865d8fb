//! End-to-end behavior of tables, cursors and the schema compiler against a
//! real SQLite database.

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tabula::prelude::*;
use tabula::{DbTable, SqliteConnection};

fn item() -> Result<Table> {
    let mut table = Table::new("Item");
    let code = table.field(Field::new("Code", FieldType::Code(20)));
    table.field(Field::new("Description", FieldType::Text(50)));
    table.field(Field::new("Qty", FieldType::Integer));
    table.field(Field::new("Price", FieldType::Decimal));
    table.field(Field::new("Released", FieldType::Date));
    table.set_primary_key(&[code]);
    Ok(table)
}

fn entry() -> Result<Table> {
    let mut table = Table::new("Entry");
    let a = table.field(Field::new("A", FieldType::Integer));
    let b = table.field(Field::new("B", FieldType::Integer));
    table.field(Field::new("Note", FieldType::Text(20)));
    table.set_primary_key(&[a, b]);
    Ok(table)
}

fn ledger() -> Result<Table> {
    let mut table = Table::new("Ledger");
    let id = table.field(Field::new("Id", FieldType::Integer).identity());
    table.field(Field::new("Amount", FieldType::Integer));
    table.set_primary_key(&[id]);
    Ok(table)
}

fn customer() -> Result<Table> {
    let mut table = Table::new("Customer");
    let no = table.field(Field::new("No", FieldType::Code(20)));
    table.field(Field::new("Name", FieldType::Text(50)));
    table.set_primary_key(&[no]);
    Ok(table)
}

fn sales_order() -> Result<Table> {
    let mut table = Table::new("SalesOrder");
    let no = table.field(Field::new("No", FieldType::Code(20)));
    table.field(Field::new("Kind", FieldType::Integer));
    table.field(
        Field::new("CustomerNo", FieldType::Code(20))
            .relation(TableRelation::new("Customer").when("Kind", 0)),
    );
    table.set_primary_key(&[no]);
    Ok(table)
}

fn open(page_size: usize) -> Database {
    let config = TabulaConfig::default().page_size(page_size);
    tabula::connect(&config).expect("open in-memory database")
}

fn catalog(factories: &[tabula::TableFactory]) -> Catalog {
    let mut catalog = Catalog::new();
    for factory in factories {
        catalog.register(*factory).expect("register table");
    }
    catalog.collect().expect("collect relations");
    catalog
}

fn insert_item(db: &mut Database, code: &str, description: &str, qty: i32) {
    let mut table = item().expect("declare item");
    table.set_value(table.field_id("Code").unwrap(), code).unwrap();
    table
        .set_value(table.field_id("Description").unwrap(), description)
        .unwrap();
    table.set_value(table.field_id("Qty").unwrap(), qty).unwrap();
    table.insert(db, true).expect("insert item");
}

fn read_codes(table: &mut Table, db: &mut Database) -> Vec<String> {
    let code = table.field_id("Code").unwrap();
    let mut codes = Vec::new();
    if table.find_set(db).expect("find_set") {
        while table.read(db).expect("read") {
            codes.push(table.value(code).unwrap().to_string());
        }
    }
    codes
}

#[test]
fn sqlite_insert_then_modify_bumps_version_by_one() {
    let mut db = open(100);
    catalog(&[item]).compile_all(&mut db).expect("compile");

    let mut table = item().unwrap();
    let (code, qty, price, released) = (
        table.field_id("Code").unwrap(),
        table.field_id("Qty").unwrap(),
        table.field_id("Price").unwrap(),
        table.field_id("Released").unwrap(),
    );
    table.set_value(code, " a001 ").unwrap();
    table.set_value(qty, 5).unwrap();
    table.set_value(price, Decimal::new(125, 1)).unwrap();
    table
        .set_value(released, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        .unwrap();
    table.insert(&mut db, true).expect("insert");
    assert_eq!(table.version(), 1);
    db.commit().expect("commit");

    let mut loaded = item().unwrap();
    loaded
        .get_or_fail(&mut db, &["A001".into()])
        .expect("row exists");
    assert_eq!(loaded.version(), 1);
    assert_eq!(loaded.value(qty).unwrap(), &Value::Int(5));
    assert_eq!(loaded.value(price).unwrap(), &Value::Decimal(Decimal::new(125, 1)));
    assert_eq!(
        loaded.value(released).unwrap(),
        &Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
    );

    loaded.set_value(qty, 7).unwrap();
    assert!(loaded.modify(&mut db, true).expect("modify"));
    assert_eq!(loaded.version(), 2);
    db.commit().expect("commit");

    let mut again = item().unwrap();
    again.get_or_fail(&mut db, &["A001".into()]).unwrap();
    assert_eq!(again.version(), 2);
    assert_eq!(again.value(qty).unwrap(), &Value::Int(7));
}

#[test]
fn sqlite_decimal_keeps_full_precision_and_compares_numerically() {
    let mut db = open(100);
    catalog(&[item]).compile_all(&mut db).unwrap();

    let exact = Decimal::from_str("12345678901234567.89").expect("decimal literal");
    for (code, price) in [("A", exact), ("B", Decimal::new(100, 1)), ("C", Decimal::new(9, 0))] {
        let mut table = item().unwrap();
        table.set_value(table.field_id("Code").unwrap(), code).unwrap();
        table.set_value(table.field_id("Price").unwrap(), price).unwrap();
        table.insert(&mut db, true).expect("insert");
    }
    db.commit().unwrap();

    let mut loaded = item().unwrap();
    let price = loaded.field_id("Price").unwrap();
    loaded.get_or_fail(&mut db, &["A".into()]).expect("row exists");
    assert_eq!(loaded.value(price).unwrap(), &Value::Decimal(exact));

    let bumped = exact + Decimal::new(1, 2);
    loaded.set_value(price, bumped).unwrap();
    assert!(loaded.modify(&mut db, true).expect("modify"));
    db.commit().unwrap();
    let mut again = item().unwrap();
    again.get_or_fail(&mut db, &["A".into()]).unwrap();
    assert_eq!(again.value(price).unwrap().to_string(), "12345678901234567.90");

    // As text "10.0" sorts before "9"; as numbers it does not.
    let mut table = item().unwrap();
    table.set_filter(price, ">=9.5", &[]).unwrap();
    assert_eq!(read_codes(&mut table, &mut db), vec!["A", "B"]);
    table.clear_filters();
    table.set_current_key(&[price]);
    assert_eq!(read_codes(&mut table, &mut db), vec!["C", "B", "A"]);
}

#[test]
fn sqlite_modify_without_changes_writes_nothing() {
    let mut db = open(100);
    catalog(&[item]).compile_all(&mut db).unwrap();
    insert_item(&mut db, "A001", "Widget", 1);
    db.commit().unwrap();

    let mut table = item().unwrap();
    table.get_or_fail(&mut db, &["A001".into()]).unwrap();
    assert!(!table.modify(&mut db, true).expect("modify"));
    assert_eq!(table.version(), 1);
    assert!(!db.in_transaction());
}

#[test]
fn sqlite_stale_cursor_raises_concurrency_error() {
    let mut db = open(100);
    catalog(&[item]).compile_all(&mut db).unwrap();
    insert_item(&mut db, "A001", "Widget", 1);
    db.commit().unwrap();

    let mut first = item().unwrap();
    let mut second = item().unwrap();
    let qty = first.field_id("Qty").unwrap();
    first.get_or_fail(&mut db, &["A001".into()]).unwrap();
    second.get_or_fail(&mut db, &["A001".into()]).unwrap();

    first.set_value(qty, 2).unwrap();
    assert!(first.modify(&mut db, true).unwrap());

    second.set_value(qty, 3).unwrap();
    let err = second.modify(&mut db, true).unwrap_err();
    match err {
        Error::Concurrency {
            table,
            key,
            affected,
        } => {
            assert_eq!(table, "Item");
            assert_eq!(key, "A001");
            assert_eq!(affected, 0);
        }
        other => panic!("expected a concurrency error, got {other:?}"),
    }

    let err = second.delete(&mut db, true).unwrap_err();
    assert!(matches!(err, Error::Concurrency { .. }));
    first.delete(&mut db, true).expect("current version deletes");
    db.commit().unwrap();
    assert!(item().unwrap().is_empty(&mut db).unwrap());
}

#[test]
fn sqlite_modify_rejects_changed_primary_key() {
    let mut db = open(100);
    catalog(&[item]).compile_all(&mut db).unwrap();
    insert_item(&mut db, "A001", "Widget", 1);

    let mut table = item().unwrap();
    let code = table.field_id("Code").unwrap();
    table.get_or_fail(&mut db, &["A001".into()]).unwrap();
    table.set_value(code, "A002").unwrap();
    assert!(matches!(
        table.modify(&mut db, true),
        Err(Error::PrimaryKeyImmutable { .. })
    ));
}

#[test]
fn sqlite_keyset_paging_walks_composite_key_in_order() {
    let mut db = open(2);
    catalog(&[entry]).compile_all(&mut db).unwrap();
    for (a, b) in [(2, 1), (1, 2), (1, 1)] {
        let mut table = entry().unwrap();
        table.set_value(table.field_id("A").unwrap(), a).unwrap();
        table.set_value(table.field_id("B").unwrap(), b).unwrap();
        table.insert(&mut db, true).unwrap();
    }
    db.commit().unwrap();

    let mut table = entry().unwrap();
    let (a, b) = (table.field_id("A").unwrap(), table.field_id("B").unwrap());
    let mut keys = Vec::new();
    assert!(table.find_set(&mut db).unwrap());
    while table.read(&mut db).unwrap() {
        keys.push((
            table.value(a).unwrap().clone(),
            table.value(b).unwrap().clone(),
        ));
    }
    assert_eq!(
        keys,
        vec![
            (Value::Int(1), Value::Int(1)),
            (Value::Int(1), Value::Int(2)),
            (Value::Int(2), Value::Int(1)),
        ]
    );
    assert!(!table.read(&mut db).unwrap());

    table.set_ascending(false);
    assert!(table.find_last(&mut db).unwrap());
    assert_eq!(table.value(a).unwrap(), &Value::Int(1));
    assert_eq!(table.value(b).unwrap(), &Value::Int(1));
}

#[test]
fn sqlite_find_page_stops_after_one_window() {
    let mut db = open(100);
    catalog(&[item]).compile_all(&mut db).unwrap();
    for code in ["A", "B", "C"] {
        insert_item(&mut db, code, "", 1);
    }

    let mut table = item().unwrap();
    let code = table.field_id("Code").unwrap();
    assert!(table.find_page(&mut db, 2).unwrap());
    let mut seen = Vec::new();
    while table.read(&mut db).unwrap() {
        seen.push(table.value(code).unwrap().to_string());
    }
    assert_eq!(seen, vec!["A", "B"]);

    assert!(table.next_set(&mut db).unwrap());
    assert!(table.read(&mut db).unwrap());
    assert_eq!(table.value(code).unwrap(), &Value::from("C"));
    assert!(!table.read(&mut db).unwrap());
    assert!(!table.next_set(&mut db).unwrap());
}

#[test]
fn sqlite_filter_expressions_select_matching_rows() {
    let mut db = open(100);
    catalog(&[item]).compile_all(&mut db).unwrap();
    insert_item(&mut db, "A", "Cable", 5);
    insert_item(&mut db, "B", "Table lamp", 10);
    insert_item(&mut db, "C", "FABRIC", 15);
    insert_item(&mut db, "D", "Chair", 20);
    insert_item(&mut db, "E", "Desk", 25);
    db.commit().unwrap();

    let mut table = item().unwrap();
    let qty = table.field_id("Qty").unwrap();
    let description = table.field_id("Description").unwrap();

    table.set_filter(qty, ">=10&<=20", &[]).unwrap();
    assert_eq!(read_codes(&mut table, &mut db), vec!["B", "C", "D"]);
    assert_eq!(table.count(&mut db).unwrap(), 3);

    table.set_filter(description, "*ab*", &[]).unwrap();
    assert_eq!(read_codes(&mut table, &mut db), vec!["B", "C"]);

    table.set_filter(qty, "%1|%2", &[Value::Int(5), Value::Int(25)]).unwrap();
    table.reset_field(description);
    assert_eq!(read_codes(&mut table, &mut db), vec!["A", "E"]);

    table.set_filter_level(FilterLevel::Private);
    table.set_range(qty, 20, 30).unwrap();
    assert_eq!(read_codes(&mut table, &mut db), vec!["E"]);

    table.clear_filters();
    assert_eq!(table.count(&mut db).unwrap(), 5);
}

#[test]
fn sqlite_malformed_filter_keeps_previous_filter() {
    let mut db = open(100);
    catalog(&[item]).compile_all(&mut db).unwrap();
    insert_item(&mut db, "A", "", 5);
    insert_item(&mut db, "B", "", 50);

    let mut table = item().unwrap();
    let qty = table.field_id("Qty").unwrap();
    table.set_filter(qty, ">10", &[]).unwrap();
    assert!(table.set_filter(qty, ">=", &[]).is_err());
    assert_eq!(read_codes(&mut table, &mut db), vec!["B"]);
}

#[test]
fn sqlite_get_ignores_filters_and_reports_missing_key() {
    let mut db = open(100);
    catalog(&[item]).compile_all(&mut db).unwrap();
    insert_item(&mut db, "A001", "", 5);

    let mut table = item().unwrap();
    table.set_range_value(table.field_id("Qty").unwrap(), 99).unwrap();
    assert!(table.get(&mut db, &["a001".into()]).unwrap());

    let err = table.get_or_fail(&mut db, &["B002".into()]).unwrap_err();
    assert!(matches!(err, Error::RecordNotFound { .. }));
    assert!(err.to_string().contains("B002"));
}

#[test]
fn sqlite_identity_key_is_generated_and_read_back() {
    let mut db = open(100);
    catalog(&[ledger]).compile_all(&mut db).unwrap();

    let mut table = ledger().unwrap();
    let (id, amount) = (table.field_id("Id").unwrap(), table.field_id("Amount").unwrap());
    for value in [10, 20] {
        table.init();
        table.set_value(amount, value).unwrap();
        table.insert(&mut db, true).unwrap();
    }
    assert_eq!(table.value(id).unwrap(), &Value::Int(2));

    let mut loaded = ledger().unwrap();
    loaded.get_or_fail(&mut db, &[Value::Int(1)]).unwrap();
    assert_eq!(loaded.value(amount).unwrap(), &Value::Int(10));
}

#[test]
fn sqlite_bulk_modify_and_delete_respect_filters() {
    let mut db = open(100);
    catalog(&[item]).compile_all(&mut db).unwrap();
    for (code, qty) in [("A", 1), ("B", 1), ("C", 2)] {
        insert_item(&mut db, code, "", qty);
    }

    let mut table = item().unwrap();
    let (qty, description) = (
        table.field_id("Qty").unwrap(),
        table.field_id("Description").unwrap(),
    );
    table.set_range_value(qty, 1).unwrap();
    assert_eq!(table.modify_all(&mut db, description, "Bulk", false).unwrap(), 2);

    let mut check = item().unwrap();
    check.get_or_fail(&mut db, &["A".into()]).unwrap();
    assert_eq!(check.value(description).unwrap(), &Value::from("Bulk"));
    assert_eq!(check.version(), 2);

    assert_eq!(table.modify_all(&mut db, description, "Row", true).unwrap(), 2);
    check.get_or_fail(&mut db, &["B".into()]).unwrap();
    assert_eq!(check.version(), 3);

    assert_eq!(table.delete_all(&mut db, false).unwrap(), 2);
    table.clear_filters();
    assert_eq!(table.count(&mut db).unwrap(), 1);
}

#[test]
fn sqlite_rename_cascades_through_conditional_relation() {
    let mut db = open(100);
    let catalog = catalog(&[customer, sales_order]);
    catalog.compile_all(&mut db).unwrap();

    let mut cust = catalog.table("Customer").unwrap();
    let no = cust.field_id("No").unwrap();
    cust.set_value(no, "C1").unwrap();
    cust.insert(&mut db, true).unwrap();
    for (order_no, kind) in [("O1", 0), ("O2", 1)] {
        let mut order = catalog.table("SalesOrder").unwrap();
        order.set_value(order.field_id("No").unwrap(), order_no).unwrap();
        order.set_value(order.field_id("Kind").unwrap(), kind).unwrap();
        order
            .set_value(order.field_id("CustomerNo").unwrap(), "C1")
            .unwrap();
        order.validate_relations(&mut db, &catalog).unwrap();
        order.insert(&mut db, true).unwrap();
    }
    db.commit().unwrap();

    cust.set_value(no, "C9").unwrap();
    assert!(cust.rename(&mut db, &catalog).unwrap());
    db.commit().unwrap();

    let mut order = catalog.table("SalesOrder").unwrap();
    let customer_no = order.field_id("CustomerNo").unwrap();
    order.get_or_fail(&mut db, &["O1".into()]).unwrap();
    assert_eq!(order.value(customer_no).unwrap(), &Value::from("C9"));
    assert_eq!(order.version(), 2);
    order.get_or_fail(&mut db, &["O2".into()]).unwrap();
    assert_eq!(order.value(customer_no).unwrap(), &Value::from("C1"));

    let mut dangling = catalog.table("SalesOrder").unwrap();
    dangling.set_value(dangling.field_id("CustomerNo").unwrap(), "NOPE").unwrap();
    let err = dangling.validate_relations(&mut db, &catalog).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn sqlite_compiler_is_idempotent_and_guards_destructive_changes() {
    fn v1() -> Result<Table> {
        let mut table = Table::new("Stock");
        let code = table.field(Field::new("Code", FieldType::Code(20)));
        table.field(Field::new("Qty", FieldType::Integer));
        table.set_primary_key(&[code]);
        Ok(table)
    }
    fn v2() -> Result<Table> {
        let mut table = v1()?;
        let qty = table.field_id("Qty")?;
        table.field(Field::new("Bin", FieldType::Code(10)));
        table.add_index("ByQty", &[qty], false);
        Ok(table)
    }
    fn v3() -> Result<Table> {
        let mut table = Table::new("Stock");
        let code = table.field(Field::new("Code", FieldType::Code(20)));
        table.field(Field::new("Bin", FieldType::Code(10)));
        table.set_primary_key(&[code]);
        Ok(table)
    }

    let mut db = open(100);
    let first = db.compile_table(&v1().unwrap()).expect("create");
    assert!(first.created);
    db.commit().unwrap();
    let again = db.compile_table(&v1().unwrap()).unwrap();
    assert!(again.is_unchanged());

    let mut stock = v1().unwrap();
    stock.set_value(stock.field_id("Code").unwrap(), "S1").unwrap();
    stock.set_value(stock.field_id("Qty").unwrap(), 4).unwrap();
    stock.insert(&mut db, true).unwrap();
    db.commit().unwrap();

    let added = db.compile_table(&v2().unwrap()).expect("add column");
    assert!(!added.executed.is_empty());
    assert!(added.disruptive.is_empty());
    db.commit().unwrap();
    assert!(db.compile_table(&v2().unwrap()).unwrap().is_unchanged());

    let err = db.compile_table(&v3().unwrap()).unwrap_err();
    assert!(matches!(err, Error::DisruptiveMigrationBlocked { .. }));
    db.rollback().unwrap();

    let mut check_db = Database::new(
        DialectKind::Sqlite.dialect(),
        Box::new(SqliteConnection::open_in_memory().unwrap()),
    )
    .with_compile_mode(CompileMode::CheckOnly);
    let report = check_db.compile_table(&v1().unwrap()).unwrap();
    assert!(report.created);
    assert!(report.executed.is_empty());
    assert!(!report.pending.is_empty());
    assert!(check_db.database_check(&[]).unwrap().is_empty());

    let mut forced = Database::new(
        DialectKind::Sqlite.dialect(),
        Box::new(SqliteConnection::open_in_memory().unwrap()),
    )
    .with_compile_mode(CompileMode::Force);
    forced.compile_table(&v2().unwrap()).unwrap();
    let report = forced.compile_table(&v3().unwrap()).expect("forced drop");
    assert!(!report.disruptive.is_empty());
    forced.commit().unwrap();
    assert!(forced.compile_table(&v3().unwrap()).unwrap().is_unchanged());
}

#[test]
fn sqlite_compiler_makes_nullable_columns_not_null() {
    fn stock() -> Result<Table> {
        let mut table = Table::new("Stock");
        let code = table.field(Field::new("Code", FieldType::Code(20)));
        table.field(Field::new("Qty", FieldType::Integer));
        table.set_primary_key(&[code]);
        Ok(table)
    }

    let mut db = open(100);
    db.compile_table(&stock().unwrap()).expect("create");
    db.commit().unwrap();
    db.execute("DROP TABLE \"Stock\"", &[]).unwrap();
    db.execute(
        "CREATE TABLE \"Stock\" (\"Code\" VARCHAR(20) NOT NULL, \"Qty\" INTEGER, \"_version\" BIGINT NOT NULL)",
        &[],
    )
    .unwrap();
    db.execute("CREATE UNIQUE INDEX \"Stock$PK\" ON \"Stock\" (\"Code\")", &[])
        .unwrap();
    db.execute(
        "INSERT INTO \"Stock\" (\"Code\", \"Qty\", \"_version\") VALUES ('S1', NULL, 1)",
        &[],
    )
    .unwrap();
    db.commit().unwrap();

    let report = db.compile_table(&stock().unwrap()).expect("tighten column");
    assert!(!report.is_unchanged());
    assert!(report.disruptive.is_empty());
    db.commit().unwrap();
    assert!(db.compile_table(&stock().unwrap()).unwrap().is_unchanged());

    let info = db.query("PRAGMA table_info(\"Stock\")", &[]).unwrap();
    let qty = info
        .rows()
        .iter()
        .find(|row| row.get_named("name") == Some(&Value::from("Qty")))
        .expect("Qty column");
    assert_eq!(qty.get_named("notnull").and_then(Value::as_i64), Some(1));

    let mut row = stock().unwrap();
    row.get_or_fail(&mut db, &["S1".into()]).expect("row survives rebuild");
    assert_eq!(row.value(row.field_id("Qty").unwrap()).unwrap(), &Value::Int(0));
}

#[test]
fn sqlite_database_check_lists_unmanaged_tables() {
    let mut db = open(100);
    catalog(&[item]).compile_all(&mut db).unwrap();
    db.execute("CREATE TABLE \"Legacy\" (\"Id\" INTEGER NOT NULL)", &[])
        .unwrap();
    db.commit().unwrap();

    let unmanaged = catalog(&[item]).database_check(&mut db).unwrap();
    assert_eq!(unmanaged, vec!["Legacy".to_string()]);
}

#[test]
fn sqlite_disconnect_drops_temporaries_and_closes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tabula.db");
    let config = TabulaConfig::default().connection_string(path.display().to_string());

    let mut db = tabula::connect(&config).unwrap();
    catalog(&[item]).compile_all(&mut db).unwrap();

    let mut scratch = item().unwrap();
    db.create_temporary(&mut scratch).expect("temporary table");
    assert_ne!(scratch.physical_name(), "Item");
    assert_eq!(db.temporary_tables().len(), 1);
    scratch.set_value(scratch.field_id("Code").unwrap(), "T1").unwrap();
    scratch.insert(&mut db, true).unwrap();
    assert_eq!(scratch.count(&mut db).unwrap(), 1);
    assert!(item().unwrap().is_empty(&mut db).unwrap());

    insert_item(&mut db, "UNCOMMITTED", "", 1);
    assert!(db.in_transaction());
    assert_eq!(db.reader_count(), 0);

    db.disconnect().expect("disconnect");
    db.disconnect().expect("second disconnect is a no-op");
    assert!(db.temporary_tables().is_empty());
    assert!(matches!(db.query("SELECT 1", &[]), Err(Error::Connection(_))));
    drop(db);

    let mut reopened = tabula::connect(&config).unwrap();
    assert!(item().unwrap().is_empty(&mut reopened).unwrap());
    let leftovers: DbTable = reopened
        .query("SELECT name FROM sqlite_temp_master", &[])
        .unwrap();
    assert!(leftovers.is_empty());
}

#[test]
fn sqlite_loaded_record_serializes_to_wire_json() {
    let mut db = open(100);
    catalog(&[item]).compile_all(&mut db).unwrap();

    let mut table = item().unwrap();
    table
        .set_from_json(&serde_json::json!({
            "Code": "J1",
            "Description": "From JSON",
            "Qty": 3,
            "Released": "2024-12-31",
        }))
        .expect("set from json");
    table.insert(&mut db, true).unwrap();

    let mut loaded = item().unwrap();
    loaded.get_or_fail(&mut db, &["J1".into()]).unwrap();
    let json = loaded.to_json().expect("to json");
    assert_eq!(json["Code"], "J1");
    assert_eq!(json["Description"], "From JSON");
    assert_eq!(json["Qty"], 3);
    assert_eq!(json["Released"], "2024-12-31");

    let mut blank = item().unwrap();
    blank.get_or_fail(&mut db, &["J1".into()]).unwrap();
    blank
        .set_value(blank.field_id("Released").unwrap(), tabula::Value::Date(tabula::BLANK_DATE))
        .unwrap();
    assert!(blank.to_json().unwrap()["Released"].is_null());
}
