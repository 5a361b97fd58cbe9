use alscope_api::models::ObjectType;
use alscope_core::Workspace;
use alscope_core::config::{IdRange, Settings};
use alscope_core::index::ProjectIndex;
use alscope_core::parser::parse_object;
use alscope_core::rewrite::{
    DocumentStore, MemoryDocumentStore, PrefixChange, RenumberPolicy, RewriteEngine, WrapMode,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn write(root: &Path, rel: &str, text: &str) -> PathBuf {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, text).unwrap();
    path
}

fn ids(index: &ProjectIndex, object_type: ObjectType) -> Vec<u32> {
    let mut ids: Vec<u32> = index
        .find_by_type(object_type)
        .iter()
        .filter_map(|o| o.id)
        .collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn test_renumber_compacts_ids_and_follows_references() {
    let dir = tempdir().unwrap();
    write(dir.path(), "A.Table.al", "table 50105 A\n{\n}\n");
    write(dir.path(), "B.Table.al", "table 50101 B\n{\n}\n");
    write(
        dir.path(),
        "P.Page.al",
        "page 50120 P\n{\n    actions\n    {\n        area(Navigation)\n        {\n            action(Self)\n            {\n                RunObject = Page 50120;\n            }\n        }\n    }\n}\n",
    );
    let codeunit = write(
        dir.path(),
        "C.Codeunit.al",
        "codeunit 50110 C\n{\n    procedure Open()\n    begin\n        Page.Run(50120);\n    end;\n}\n",
    );

    let workspace = Workspace::new(dir.path(), Settings::default());
    workspace.rebuild().await.unwrap();
    let policy = RenumberPolicy::new(vec![IdRange::new(50100, 50149)]);
    let result = workspace.renumber(&policy).await.unwrap();

    assert!(result.faults.is_empty(), "{:?}", result.faults);
    assert_eq!(result.objects_changed, 4);

    let index = workspace.snapshot().await;
    assert_eq!(ids(&index, ObjectType::Table), vec![50100, 50101]);
    assert_eq!(index.find_by_name(ObjectType::Table, "B")[0].id, Some(50100));
    assert_eq!(index.find_by_name(ObjectType::Page, "P")[0].id, Some(50100));

    let code = std::fs::read_to_string(&codeunit).unwrap();
    assert!(code.contains("Page.Run(50100);"));
    let page = std::fs::read_to_string(workspace.root().join("P.Page.al")).unwrap();
    assert!(page.contains("RunObject = Page 50100;"));
}

#[tokio::test]
async fn test_renumber_leaves_every_type_duplicate_free() {
    let dir = tempdir().unwrap();
    for (i, id) in [50130, 50100, 50100, 50177].iter().enumerate() {
        write(
            dir.path(),
            &format!("T{i}.Table.al"),
            &format!("table {id} T{i}\n{{\n}}\n"),
        );
    }
    write(dir.path(), "X.TableExt.al", "tableextension 50100 X extends Customer\n{\n}\n");

    let workspace = Workspace::new(dir.path(), Settings::default());
    workspace.rebuild().await.unwrap();
    workspace
        .renumber(&RenumberPolicy::new(vec![IdRange::new(50100, 50101), IdRange::new(50140, 50149)]))
        .await
        .unwrap();

    let index = workspace.snapshot().await;
    for object_type in [ObjectType::Table, ObjectType::TableExtension] {
        let ids = ids(&index, object_type);
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len(), "{object_type}: {ids:?}");
    }
    assert_eq!(ids(&index, ObjectType::Table), vec![50100, 50101, 50140, 50141]);
}

#[tokio::test]
async fn test_renumber_without_ranges_is_rejected() {
    let dir = tempdir().unwrap();
    let workspace = Workspace::new(dir.path(), Settings::default());
    let err = workspace.renumber(&RenumberPolicy::new(vec![])).await;
    assert!(matches!(err, Err(alscope_core::CoreError::Plan(_))));
}

#[tokio::test]
async fn test_renumber_keeps_ids_of_unreadable_objects() {
    let store = MemoryDocumentStore::new();
    let a = PathBuf::from("/p/a.al");
    let b = PathBuf::from("/p/b.al");
    store.insert(&b, "table 50101 B\n{\n}\n");

    let mut index = ProjectIndex::new();
    index
        .upsert(&a, parse_object(&a, "table 50100 A\n{\n}\n").unwrap())
        .unwrap();
    index
        .upsert(&b, parse_object(&b, "table 50101 B\n{\n}\n").unwrap())
        .unwrap();

    let engine = RewriteEngine::new(&store);
    let result = engine
        .renumber(&index, &RenumberPolicy::new(vec![IdRange::new(50100, 50149)]))
        .await
        .unwrap();

    assert_eq!(result.faults.len(), 1);
    assert!(result.faults[0].message.starts_with("Skipped /p/a.al"));
    assert_eq!(store.read(&b).await.unwrap(), "table 50101 B\n{\n}\n");
}

#[tokio::test]
async fn test_change_prefix_requires_a_separator() {
    let dir = tempdir().unwrap();
    write(dir.path(), "Customer.Table.al", "table 50100 ABC_Customer\n{\n}\n");
    write(dir.path(), "Other.Table.al", "table 50101 ABCD_Customer\n{\n}\n");
    let card = write(
        dir.path(),
        "Card.Page.al",
        "page 50100 \"ABC_Customer Card\"\n{\n    SourceTable = ABC_Customer;\n}\n",
    );
    write(
        dir.path(),
        ".vscode/settings.json",
        "{\n    \"editor.tabSize\": 4,\n    \"CRS.ObjectNamePrefix\": \"ABC\"\n}\n",
    );

    let workspace = Workspace::open(dir.path()).unwrap();
    workspace.rebuild().await.unwrap();
    let mut change = PrefixChange::new("ABC", "XYZ");
    change.update_settings = true;
    let result = workspace.change_prefix(&change).await.unwrap();

    assert!(result.faults.is_empty(), "{:?}", result.faults);
    assert_eq!(result.objects_changed, 2);

    let index = workspace.snapshot().await;
    assert!(index.has_object(ObjectType::Table, "XYZ_Customer"));
    assert!(index.has_object(ObjectType::Table, "ABCD_Customer"));
    assert!(index.has_object(ObjectType::Page, "XYZ_Customer Card"));
    assert!(!index.has_object(ObjectType::Table, "ABC_Customer"));

    let page = std::fs::read_to_string(card).unwrap();
    assert!(page.contains("SourceTable = XYZ_Customer;"));

    let settings = Settings::load(workspace.root()).unwrap();
    assert_eq!(settings.object_prefix.as_deref(), Some("XYZ"));
    assert_eq!(workspace.settings().await.object_prefix.as_deref(), Some("XYZ"));
    let raw = std::fs::read_to_string(Settings::settings_path(workspace.root())).unwrap();
    assert!(raw.contains("editor.tabSize"));
}

#[tokio::test]
async fn test_change_prefix_leaves_fields_when_disabled() {
    let dir = tempdir().unwrap();
    write(dir.path(), "Customer.Table.al", "table 50100 \"ABC Customer\"\n{\n}\n");
    let order = write(
        dir.path(),
        "Order.Table.al",
        "table 50101 \"ABC Order\"\n{\n    fields\n    {\n        field(1; \"ABC Customer\"; Code[20])\n        {\n            TableRelation = \"ABC Customer\";\n        }\n    }\n}\n",
    );

    let workspace = Workspace::new(dir.path(), Settings::default());
    workspace.rebuild().await.unwrap();
    let mut change = PrefixChange::new("ABC", "XYZ");
    change.rename_fields = false;
    let result = workspace.change_prefix(&change).await.unwrap();

    assert!(result.faults.is_empty(), "{:?}", result.faults);
    assert_eq!(result.objects_changed, 2);
    assert_eq!(result.fields_changed, 0);

    let text = std::fs::read_to_string(&order).unwrap();
    assert!(text.contains("field(1; \"ABC Customer\"; Code[20])"));
    assert!(text.contains("TableRelation = \"XYZ Customer\";"));
    let index = workspace.snapshot().await;
    let order = workspace.root().join("Order.Table.al");
    assert_eq!(index.get(&order).unwrap().fields[0].name, "ABC Customer");
}

const SOURCE_EXT: &str = "tableextension 50100 \"ABC Sales Header\" extends \"Sales Header\"\n{\n    fields\n    {\n        field(10; Color; Text[30]) { }\n        field(20; Size; Integer) { }\n    }\n}\n";

#[tokio::test]
async fn test_copy_fields_adds_only_missing_fields() {
    let dir = tempdir().unwrap();
    write(dir.path(), "SalesHeader.TableExt.al", SOURCE_EXT);
    write(
        dir.path(),
        "SalesInv.TableExt.al",
        "tableextension 50101 \"ABC Sales Inv. Header\" extends \"Sales Invoice Header\"\n{\n    fields\n    {\n        field(10; Color; Text[30]) { }\n    }\n}\n",
    );

    let workspace = Workspace::new(dir.path(), Settings::default());
    workspace.rebuild().await.unwrap();
    let result = workspace
        .copy_fields(&workspace.root().join("SalesHeader.TableExt.al"))
        .await
        .unwrap();

    assert!(result.faults.is_empty(), "{:?}", result.faults);
    assert_eq!(result.fields_changed, 1);
    assert_eq!(result.files_changed, 1);
    assert_eq!(result.summary(), "Added 1 field");

    let index = workspace.snapshot().await;
    let target = index
        .get(&workspace.root().join("SalesInv.TableExt.al"))
        .unwrap();
    let fields: Vec<(u32, &str)> = target.fields.iter().map(|f| (f.id, f.name.as_str())).collect();
    assert_eq!(fields, vec![(10, "Color"), (20, "Size")]);
}

#[tokio::test]
async fn test_copy_fields_faults_missing_target_document() {
    let store = MemoryDocumentStore::new();
    let source = PathBuf::from("/p/SalesHeader.TableExt.al");
    store.insert(&source, SOURCE_EXT);

    let engine = RewriteEngine::new(&store);
    let result = engine
        .copy_fields(&source, &[("Sales Invoice Header".to_string(), Some(PathBuf::from("/p/missing.al")))])
        .await
        .unwrap();

    assert_eq!(result.fields_changed, 0);
    assert_eq!(result.faults.len(), 2);
    let location = result.faults[0].location.as_ref().unwrap();
    assert_eq!(location.path, source);
    assert_eq!(location.line, 5);
    assert_eq!(store.read(&source).await.unwrap(), SOURCE_EXT);
}

#[tokio::test]
async fn test_wrapping_twice_adds_no_regions() {
    let dir = tempdir().unwrap();
    let path = write(
        dir.path(),
        "Util.Codeunit.al",
        "codeunit 50100 Util\n{\n    procedure A()\n    begin\n    end;\n\n    local procedure B(x: Integer): Integer\n    begin\n        exit(x);\n    end;\n}\n",
    );

    let workspace = Workspace::new(dir.path(), Settings::default());
    workspace.rebuild().await.unwrap();

    let first = workspace.wrap_regions(&[], WrapMode::Procedures).await.unwrap();
    assert_eq!(first.items_changed, 2);
    let wrapped = std::fs::read_to_string(&path).unwrap();
    assert!(wrapped.contains("    #region A\n    procedure A()"));
    assert!(wrapped.contains("    #region B\n    local procedure B"));

    let second = workspace.wrap_regions(&[], WrapMode::Procedures).await.unwrap();
    assert_eq!(second.items_changed, 0);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), wrapped);
}

#[tokio::test]
async fn test_create_related_uses_naming_convention() {
    let dir = tempdir().unwrap();
    write(dir.path(), "src/SalesHeader.TableExt.al", SOURCE_EXT);
    let settings = Settings {
        object_prefix: Some("ABC".into()),
        use_old_file_naming: true,
        id_ranges: vec![IdRange::new(50100, 50149)],
        ..Settings::default()
    };

    let workspace = Workspace::new(dir.path(), settings);
    workspace.rebuild().await.unwrap();
    let start = workspace.root().join("src/SalesHeader.TableExt.al");
    let result = workspace
        .create_related(&start, &[ObjectType::Table])
        .await
        .unwrap();

    assert!(result.faults.is_empty(), "{:?}", result.faults);
    assert_eq!(result.objects_changed, 5);
    let archive = workspace.root().join("src/TabExt50101.ABCSalesHeaderArchive.al");
    assert!(archive.exists());

    let index = workspace.snapshot().await;
    let created = index.get(&archive).unwrap();
    assert_eq!(created.name, "ABC Sales Header Archive");
    assert_eq!(created.extended_name.as_deref(), Some("Sales Header Archive"));

    let again = workspace
        .create_related(&start, &[ObjectType::Table])
        .await
        .unwrap();
    assert_eq!(again.objects_changed, 0);
}

#[tokio::test]
async fn test_create_related_requires_prefix() {
    let dir = tempdir().unwrap();
    write(dir.path(), "SalesHeader.TableExt.al", SOURCE_EXT);
    let workspace = Workspace::new(dir.path(), Settings::default());
    workspace.rebuild().await.unwrap();

    let err = workspace
        .create_related(&workspace.root().join("SalesHeader.TableExt.al"), &[])
        .await;
    assert!(matches!(err, Err(alscope_core::CoreError::Plan(_))));
}
