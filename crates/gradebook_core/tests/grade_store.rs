use gradebook_core::db::open_db_in_memory;
use gradebook_core::{
    Composition, Element, GradeListQuery, GradePatch, GradeStore, GradeValidationError, NewGrade,
    RepoError, SqliteGradeStore,
};

#[test]
fn insert_and_lookup_roundtrip_keeps_every_field() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteGradeStore::try_new(&conn).unwrap();

    let composition = Composition::default()
        .with(Element::Carbon, "1.40-1.60")
        .with(Element::Chromium, "11.0-13.0");
    let id = store
        .insert_grade(
            &NewGrade::new("X153CrMoV12")
                .with_standard("DIN EN 10027")
                .with_analogues(["D2", "1.2379", "Conqueror SuperClean"])
                .with_composition(composition.clone())
                .with_link("https://example.com/x153")
                .with_manufacturer("Example Steelworks"),
        )
        .unwrap();

    let grade = store.get_grade("X153CrMoV12").unwrap().unwrap();
    assert_eq!(grade.id, id);
    assert_eq!(grade.standard, "DIN EN 10027");
    assert_eq!(grade.analogues, vec!["D2", "1.2379", "Conqueror SuperClean"]);
    assert_eq!(grade.composition, composition);
    assert_eq!(grade.link.as_deref(), Some("https://example.com/x153"));
    assert_eq!(grade.manufacturer.as_deref(), Some("Example Steelworks"));
    assert!(store.get_grade("missing").unwrap().is_none());
}

#[test]
fn insert_rejects_invalid_records() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteGradeStore::try_new(&conn).unwrap();

    let err = store
        .insert_grade(&NewGrade::new("O1").with_analogues(["O1"]))
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(GradeValidationError::SelfReference(_))
    ));

    let err = store.insert_grade(&NewGrade::new(" ")).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(GradeValidationError::EmptyDesignation)
    ));
}

#[test]
fn list_filters_compose() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteGradeStore::try_new(&conn).unwrap();
    store
        .insert_grade(&NewGrade::new("A2").with_analogues(["1.2363"]))
        .unwrap();
    store
        .insert_grade(
            &NewGrade::new("1.2363")
                .with_composition(Composition::default().with(Element::Carbon, "1.0")),
        )
        .unwrap();
    store
        .insert_grade(
            &NewGrade::new("A2/A2H")
                .with_composition(Composition::default().with(Element::Silicon, "0.3")),
        )
        .unwrap();

    let all = store.list_grades(&GradeListQuery::all()).unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.windows(2).all(|pair| pair[0].id < pair[1].id));

    let with_analogues = store.list_grades(&GradeListQuery::with_analogues()).unwrap();
    assert_eq!(with_analogues.len(), 1);
    assert_eq!(with_analogues[0].designation, "A2");

    let missing_key = store
        .list_grades(&GradeListQuery {
            missing_key_chemistry: true,
            ..GradeListQuery::default()
        })
        .unwrap();
    let names: Vec<&str> = missing_key.iter().map(|g| g.designation.as_str()).collect();
    assert_eq!(names, vec!["A2", "A2/A2H"]);

    let slashed = store
        .list_grades(&GradeListQuery {
            designation_contains: Some("/".to_string()),
            ..GradeListQuery::default()
        })
        .unwrap();
    assert_eq!(slashed.len(), 1);
}

#[test]
fn update_touches_only_patched_fields() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteGradeStore::try_new(&conn).unwrap();
    store
        .insert_grade(
            &NewGrade::new("H13")
                .with_standard("AISI H13")
                .with_analogues(["1.2344"]),
        )
        .unwrap();

    store
        .update_grade("H13", &GradePatch::analogues(vec!["1.2344".into(), "SKD61".into()]))
        .unwrap();
    let grade = store.get_grade("H13").unwrap().unwrap();
    assert_eq!(grade.analogues, vec!["1.2344", "SKD61"]);
    assert_eq!(grade.standard, "AISI H13");

    let err = store
        .update_grade("H13", &GradePatch::analogues(vec!["H13".into()]))
        .unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));

    let err = store
        .update_grade("nope", &GradePatch::standard("AISI, USA"))
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound(name) if name == "nope"));
}

#[test]
fn deletes_report_misses() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteGradeStore::try_new(&conn).unwrap();
    let first = store.insert_grade(&NewGrade::new("M2")).unwrap();
    store.insert_grade(&NewGrade::new("M2")).unwrap();

    store.delete_grade(first).unwrap();
    assert!(matches!(
        store.delete_grade(first).unwrap_err(),
        RepoError::IdNotFound(id) if id == first
    ));
    assert_eq!(store.delete_by_designation("M2").unwrap(), 1);
    assert!(matches!(
        store.delete_by_designation("M2").unwrap_err(),
        RepoError::NotFound(_)
    ));
}

#[test]
fn failed_transaction_rolls_back_every_write() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteGradeStore::try_new(&conn).unwrap();
    store.insert_grade(&NewGrade::new("S7")).unwrap();

    let err = store
        .in_transaction(|tx| {
            tx.update_grade("S7", &GradePatch::standard("AISI, USA"))?;
            tx.delete_by_designation("S7")?;
            tx.update_grade("S7", &GradePatch::standard("unreachable"))
        })
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound(_)));

    let grade = store.get_grade("S7").unwrap().unwrap();
    assert_eq!(grade.standard, "");
    assert!(conn.is_autocommit());
}

#[test]
fn nested_transactions_join_the_outer_one() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteGradeStore::try_new(&conn).unwrap();

    let result: Result<(), RepoError> = store.in_transaction(|tx| {
        tx.in_transaction(|inner| inner.insert_grade(&NewGrade::new("O2")).map(|_| ()))?;
        tx.delete_by_designation("absent").map(|_| ())
    });
    assert!(result.is_err());
    assert!(store.get_grade("O2").unwrap().is_none());
}

#[test]
fn update_by_id_touches_one_duplicate_row() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteGradeStore::try_new(&conn).unwrap();
    let first = store
        .insert_grade(&NewGrade::new("X1").with_standard("GOST X1"))
        .unwrap();
    let second = store
        .insert_grade(&NewGrade::new("X1").with_standard("ASTM ref"))
        .unwrap();

    store
        .update_grade_by_id(first, &GradePatch::standard("GOST, Russia"))
        .unwrap();
    let rows = store.list_grades(&GradeListQuery::by_designation("X1")).unwrap();
    assert_eq!(rows[0].standard, "GOST, Russia");
    assert_eq!(rows[1].id, second);
    assert_eq!(rows[1].standard, "ASTM ref");

    let err = store
        .update_grade_by_id(second, &GradePatch::analogues(vec!["X1".into()]))
        .unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));
    assert!(matches!(
        store
            .update_grade_by_id(second + 100, &GradePatch::standard("x"))
            .unwrap_err(),
        RepoError::IdNotFound(_)
    ));
}

#[test]
fn padded_legacy_designations_read_and_match_trimmed() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch("INSERT INTO grades (designation, analogues) VALUES (' D2 ', 'X');")
        .unwrap();
    let store = SqliteGradeStore::try_new(&conn).unwrap();

    let grade = store.get_grade("D2").unwrap().unwrap();
    assert_eq!(grade.designation, "D2");
    assert_eq!(
        store
            .list_grades(&GradeListQuery::by_designation("D2"))
            .unwrap()
            .len(),
        1
    );

    store
        .update_grade("D2", &GradePatch::analogues(vec!["X".into(), "1.2379".into()]))
        .unwrap();
    let stored: String = conn
        .query_row("SELECT designation FROM grades WHERE id = ?1;", [grade.id], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(stored, "D2");
    assert_eq!(store.delete_by_designation("D2").unwrap(), 1);
}
