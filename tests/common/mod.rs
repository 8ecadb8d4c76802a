//! On-disk model trees for integration tests.

#![allow(dead_code)]

use modelgen::ToolConfig;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const DOMAINS: &str = "\
domain:
  name: DO_ID
  label: Identifiant
  kind: integer
  autoGenerated: true
---
domain:
  name: DO_CODE
  kind: string
  length: 3
---
domain:
  name: DO_LIBELLE
  kind: string
  length: 100
";

pub const ADDRESS: &str = "\
app: Shop
module: Address
kind: data
---
class:
  name: Address
  label: Adresse
  properties:
    - name: Id
      domain: DO_ID
      primaryKey: true
    - name: City
      domain: DO_LIBELLE
      required: true
";

pub const CUSTOMER: &str = "\
app: Shop
module: Customer
kind: data
uses:
  - address
  - reference
---
class:
  name: Customer
  label: Client
  defaultProperty: Name
  properties:
    - name: Id
      domain: DO_ID
      primaryKey: true
    - name: Name
      domain: DO_LIBELLE
      required: true
    - association: Address
      type: manyToOne
      role: billing
    - association: Status
      type: manyToOne
";

pub const REFERENCE: &str = "\
app: Shop
module: Reference
kind: data
---
class:
  name: Status
  label: Statut
  reference: true
  properties:
    - name: Id
      domain: DO_ID
      primaryKey: true
    - name: Code
      domain: DO_CODE
      required: true
  values:
    Active:
      Code: ACT
";

pub const ORDER: &str = "\
app: Shop
module: Order
kind: data
uses:
  - customer
---
class:
  name: Order
  label: Commande
  properties:
    - name: Id
      domain: DO_ID
      primaryKey: true
    - association: Customer
      type: manyToOne
---
class:
  name: OrderView
  label: Vue commande
  extends: Order
  properties:
    - alias:
        class: Customer
        property: Name
      prefix: Customer
";

pub const REFERENCE_DATA: &str = r#"{ "Status": { "Closed": { "Code": "CLO" } } }"#;

pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    /// A complete shop model: domains, address, reference, customer and order files.
    pub fn shop() -> Self {
        let fixture = Fixture::empty();
        fixture.write("domains.model", DOMAINS);
        fixture.write("address.model", ADDRESS);
        fixture.write("reference.model", REFERENCE);
        fixture.write("customer.model", CUSTOMER);
        fixture.write("sales/order.model", ORDER);
        fixture.write_data(REFERENCE_DATA);
        fixture
    }

    pub fn empty() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("model")).expect("model dir");
        Fixture { dir }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("model")
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root().join(relative)
    }

    pub fn write(&self, relative: &str, text: &str) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("parent dir");
        }
        fs::write(&path, text).expect("write model file");
        path
    }

    pub fn remove(&self, relative: &str) -> PathBuf {
        let path = self.path(relative);
        fs::remove_file(&path).expect("remove model file");
        path
    }

    pub fn data_path(&self) -> PathBuf {
        self.dir.path().join("reference.json")
    }

    pub fn write_data(&self, json: &str) -> PathBuf {
        let path = self.data_path();
        fs::write(&path, json).expect("write reference data");
        path
    }

    pub fn config(&self) -> ToolConfig {
        ToolConfig::new(self.root()).with_reference_data(self.data_path())
    }
}

pub fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}
