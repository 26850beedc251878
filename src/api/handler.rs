//! The per-namespace data API facade.
//!
//! Resolves item identifiers, shapes responses and routes to the storage
//! engine, the control store or an external collaborator.

use std::sync::Arc;

use serde_json::Value;

use super::address::Addressing;
use super::collaborators::Collaborators;
use super::request::{parse_reference, MasterOption, UpdateBody};
use super::response::{FindResponse, GetResponse, ItemView};
use crate::config::{DataApiSettings, NamespaceConfig};
use crate::control::ApiMetadataStore;
use crate::engine::{
    master_of, DeleteRequest, FindRequest, ItemMasterOutcome, ItemPage, ListRequest, StorageEngine,
    TableKind, UpdateResponse, Usage,
};
use crate::error::{DataApiError, DataApiResult};
use crate::observability::{log_event_with_fields, Event};
use crate::params;
use crate::schema::{SchemaKind, SchemaValidationCache};
use crate::storage::{BackupDescription, Item};

const NO_LINEAGE: &str = "No lineage store configured for this Data API";
const NO_SEARCH: &str = "No search endpoint configured for this Data API";
const NO_EXPORT: &str = "No export service configured for this Data API";

/// Key under `SearchConfig` holding the search domain
const SEARCH_DOMAIN: &str = "ElasticSearchDomain";
const SEARCH_ENDPOINT: &str = "ElasticSearchEndpoint";

pub struct DataApi {
    engine: StorageEngine,
    control: Arc<ApiMetadataStore>,
    schemas: Arc<SchemaValidationCache>,
    addressing: Addressing,
    collaborators: Collaborators,
}

impl std::fmt::Debug for DataApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataApi")
            .field("addressing", &self.addressing)
            .finish_non_exhaustive()
    }
}

impl DataApi {
    pub fn new(
        engine: StorageEngine,
        control: Arc<ApiMetadataStore>,
        schemas: Arc<SchemaValidationCache>,
        settings: &DataApiSettings,
        collaborators: Collaborators,
    ) -> Self {
        let account = engine
            .config()
            .deployed_account
            .clone()
            .unwrap_or_else(|| settings.deployed_account.clone());
        let addressing = Addressing::new(settings.region.clone(), account, engine.resource_table());
        Self {
            engine,
            control,
            schemas,
            addressing,
            collaborators,
        }
    }

    /// Control key of the namespace, `<api>-<stage>`
    pub fn namespace(&self) -> String {
        self.engine.config().control_key()
    }

    pub fn config(&self) -> &NamespaceConfig {
        self.engine.config()
    }

    pub fn engine(&self) -> &StorageEngine {
        &self.engine
    }

    pub fn primary_key(&self) -> &str {
        self.engine.primary_key()
    }

    /// Structured address of `id`
    pub fn address(&self, id: &str) -> String {
        self.addressing.address(id).to_string()
    }

    fn view(&self, id: &str, resource: Option<Item>, metadata: Option<Item>) -> ItemView {
        ItemView {
            item_arn: self.address(id),
            resource,
            metadata,
        }
    }

    pub fn check(&self, identifier: &str) -> DataApiResult<()> {
        let id = self.addressing.resolve(identifier)?;
        self.engine.check(&id)
    }

    /// Fetches an item and, per `master`, its item master
    pub fn get(&self, identifier: &str, master: MasterOption, suppress_metadata: bool) -> DataApiResult<GetResponse> {
        let id = self.addressing.resolve(identifier)?;
        let record = self.engine.get(&id, !suppress_metadata)?;
        let master_id = master_of(&record.resource).map(str::to_string);
        let item = self.view(&id, Some(record.resource), record.metadata);

        let master = match (master, master_id) {
            (MasterOption::ItemOnly, _) | (_, None) => None,
            (MasterOption::Include, Some(master_id)) => {
                let master = self.engine.get(&master_id, !suppress_metadata)?;
                Some(self.view(&master_id, Some(master.resource), master.metadata))
            }
            (MasterOption::Prefer, Some(master_id)) => {
                self.engine.check(&master_id)?;
                let mut identity = Item::new();
                identity.insert(self.primary_key().to_string(), Value::String(master_id.clone()));
                Some(self.view(&master_id, Some(identity), None))
            }
        };
        Ok(GetResponse { item, master })
    }

    pub fn get_metadata(&self, identifier: &str) -> DataApiResult<Option<Item>> {
        let id = self.addressing.resolve(identifier)?;
        self.engine.get_metadata(&id)
    }

    /// Writes Resource and Metadata fields.
    ///
    /// `ItemMasterID` can only be set through [`DataApi::set_item_master`].
    /// References are stored with the lineage collaborator before the write.
    pub fn update(&self, identifier: &str, body: UpdateBody, caller: &str) -> DataApiResult<UpdateResponse> {
        let id = self.addressing.resolve(identifier)?;
        if body
            .resource
            .as_ref()
            .map_or(false, |resource| resource.contains_key(params::ITEM_MASTER_ID))
        {
            return Err(DataApiError::invalid(format!(
                "Cannot update the {} attribute directly. Use the item master operations",
                params::ITEM_MASTER_ID
            )));
        }

        let (update, references) = body.into_parts();
        if let Some(references) = references {
            self.put_references(&id, &references)?;
        }
        self.engine.update(&id, update, caller)
    }

    fn put_references(&self, id: &str, references: &[Value]) -> DataApiResult<()> {
        let lineage = self
            .collaborators
            .lineage
            .as_ref()
            .ok_or_else(|| DataApiError::unimplemented(NO_LINEAGE))?;
        let parsed = references
            .iter()
            .map(parse_reference)
            .collect::<DataApiResult<Vec<_>>>()?;

        let from = self.address(id);
        for (to, properties) in &parsed {
            lineage.create_reference(&from, to, properties)?;
        }
        log_event_with_fields(
            Event::ReferencesAdded,
            &[("from", from.as_str()), ("count", parsed.len().to_string().as_str())],
        );
        Ok(())
    }

    pub fn delete(&self, identifier: &str, request: DeleteRequest, caller: &str) -> DataApiResult<bool> {
        let id = self.addressing.resolve(identifier)?;
        self.engine.delete(&id, request, caller)
    }

    pub fn restore(&self, identifier: &str, caller: &str) -> DataApiResult<()> {
        let id = self.addressing.resolve(identifier)?;
        self.engine.restore(&id, caller)
    }

    pub fn list(&self, request: &ListRequest) -> DataApiResult<ItemPage> {
        self.engine.list(request)
    }

    /// Searches one record kind and addresses every match
    pub fn find(&self, request: &FindRequest) -> DataApiResult<FindResponse> {
        let page = self.engine.find(request)?;
        let metadata_search = request.resource.is_none();
        let pk = self.primary_key();

        let items = page
            .items
            .into_iter()
            .filter_map(|item| {
                let key = item.get(pk)?.as_str()?.to_string();
                Some(if metadata_search {
                    let id = key.strip_suffix(params::META_ID_SUFFIX).unwrap_or(&key);
                    self.view(id, None, Some(item))
                } else {
                    self.view(&key, Some(item), None)
                })
            })
            .collect();
        Ok(FindResponse {
            items,
            last_evaluated_key: page.last_evaluated_key,
        })
    }

    /// Links each of `ids` to `master_identifier`
    pub fn set_item_master(
        &self,
        ids: &[String],
        master_identifier: &str,
        caller: &str,
    ) -> DataApiResult<Vec<ItemMasterOutcome>> {
        let master = self.addressing.resolve(master_identifier)?;
        let ids = ids
            .iter()
            .filter(|id| !id.trim().is_empty())
            .map(|id| self.addressing.resolve(id.trim()))
            .collect::<DataApiResult<Vec<_>>>()?;
        self.engine.item_master_update(&ids, &master, caller)
    }

    /// Unlinks an item from the master the caller asserts it has
    pub fn remove_item_master(&self, identifier: &str, asserted_master: &str, caller: &str) -> DataApiResult<bool> {
        let id = self.addressing.resolve(identifier)?;
        let asserted = self.addressing.resolve(asserted_master)?;
        self.engine.item_master_delete(&id, &asserted, caller)
    }

    pub fn get_schema(&self, kind: SchemaKind) -> DataApiResult<Option<Value>> {
        self.control.get_schema(&self.namespace(), kind)
    }

    /// Stores a schema and drops the cached validator
    pub fn put_schema(&self, kind: SchemaKind, schema: Value, caller: &str) -> DataApiResult<Item> {
        let namespace = self.namespace();
        let stored = self.control.put_schema(&namespace, kind, schema, caller)?;
        self.schemas.invalidate(&namespace, Some(kind));
        log_event_with_fields(
            Event::SchemaStored,
            &[("api", namespace.as_str()), ("kind", kind.as_str()), ("caller", caller)],
        );
        Ok(stored)
    }

    /// Removes the schema named by `schema_type` (`Resource` or `Metadata`)
    pub fn remove_schema(&self, schema_type: &str, caller: &str) -> DataApiResult<bool> {
        let kind = SchemaKind::parse(schema_type)?;
        let namespace = self.namespace();
        let removed = self.control.delete_schema(&namespace, kind)?;
        self.schemas.invalidate(&namespace, Some(kind));
        log_event_with_fields(
            Event::SchemaRemoved,
            &[("api", namespace.as_str()), ("kind", kind.as_str()), ("caller", caller)],
        );
        Ok(removed)
    }

    /// The namespace's Meta record, projected to `filters` when given
    pub fn get_namespace_metadata(&self, filters: Option<&[&str]>) -> DataApiResult<Option<Item>> {
        self.control.get_api_metadata(&self.namespace(), filters)
    }

    pub fn usage(&self) -> DataApiResult<Usage> {
        self.engine.usage()
    }

    /// Table and stream identifiers, plus graph and search endpoints when configured
    pub fn endpoints(&self) -> DataApiResult<Value> {
        let streams = self.engine.streams()?;
        let mut endpoints = serde_json::to_value(streams)
            .map_err(|e| DataApiError::detailed(format!("Unable to encode endpoints: {}", e), None))?;
        if let Value::Object(map) = &mut endpoints {
            let graph = self
                .config()
                .gremlin_address
                .clone()
                .or_else(|| self.collaborators.lineage.as_ref().and_then(|l| l.endpoint()));
            if let Some(graph) = graph {
                map.insert("GraphURL".to_string(), Value::String(graph));
            }
            if let Some(search) = self.search_endpoint() {
                map.insert("Elasticsearch".to_string(), search);
            }
        }
        Ok(endpoints)
    }

    fn search_endpoint(&self) -> Option<Value> {
        self.config()
            .search_config
            .as_ref()?
            .get(SEARCH_DOMAIN)?
            .get(SEARCH_ENDPOINT)
            .cloned()
    }

    /// Runs `query` against one record kind, or both when `kind` is `None`
    pub fn search(&self, kind: Option<TableKind>, query: &Value) -> DataApiResult<Value> {
        let search = self
            .collaborators
            .search
            .as_ref()
            .ok_or_else(|| DataApiError::unimplemented(NO_SEARCH))?;
        let table = self.engine.resource_table();
        let kinds = match kind {
            Some(kind) => vec![kind],
            None => vec![TableKind::Resource, TableKind::Metadata],
        };

        let mut results = serde_json::Map::new();
        for kind in kinds {
            let name = match kind {
                TableKind::Resource => params::RESOURCE,
                TableKind::Metadata => params::METADATA,
            };
            results.insert(name.to_string(), search.search(table, kind, query)?);
        }
        Ok(Value::Object(results))
    }

    /// Items referenced by an item, to `depth` hops
    pub fn downstream(&self, identifier: &str, depth: u32) -> DataApiResult<Option<Value>> {
        let lineage = self
            .collaborators
            .lineage
            .as_ref()
            .ok_or_else(|| DataApiError::unimplemented(NO_LINEAGE))?;
        let id = self.addressing.resolve(identifier)?;
        lineage.downstream(&self.address(&id), depth)
    }

    /// Items referencing an item, to `depth` hops
    pub fn upstream(&self, identifier: &str, depth: u32) -> DataApiResult<Option<Value>> {
        let lineage = self
            .collaborators
            .lineage
            .as_ref()
            .ok_or_else(|| DataApiError::unimplemented(NO_LINEAGE))?;
        let id = self.addressing.resolve(identifier)?;
        lineage.upstream(&self.address(&id), depth)
    }

    /// Starts a bulk export of both tables
    pub fn export(&self, options: &Value) -> DataApiResult<Value> {
        let export = self
            .collaborators
            .export
            .as_ref()
            .ok_or_else(|| DataApiError::unimplemented(NO_EXPORT))?;
        let mut jobs = serde_json::Map::new();
        jobs.insert(
            params::RESOURCE.to_string(),
            export.start_export(self.engine.resource_table(), options)?,
        );
        jobs.insert(
            params::METADATA.to_string(),
            export.start_export(self.engine.metadata_table(), options)?,
        );
        Ok(Value::Object(jobs))
    }

    pub fn export_status(&self, job_name: &str, run_id: &str) -> DataApiResult<Value> {
        let export = self
            .collaborators
            .export
            .as_ref()
            .ok_or_else(|| DataApiError::unimplemented(NO_EXPORT))?;
        export.export_status(job_name, run_id)
    }

    /// Deletes both tables, optionally after a final backup, and all control records
    pub fn drop_namespace(&self, backup: bool) -> DataApiResult<Vec<BackupDescription>> {
        let backups = self.engine.drop_tables(backup)?;
        let namespace = self.namespace();
        self.control.delete_all_api_metadata(&namespace)?;
        self.schemas.invalidate(&namespace, None);
        Ok(backups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::collaborators::{ExportProvider, LineageProvider, SearchProvider};
    use crate::error::ErrorKind;
    use crate::observability::MetricsRegistry;
    use crate::storage::MemoryBackend;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingLineage {
        links: Mutex<Vec<(String, String, Item)>>,
    }

    impl LineageProvider for RecordingLineage {
        fn create_reference(&self, from: &str, to: &str, properties: &Item) -> DataApiResult<()> {
            self.links
                .lock()
                .unwrap()
                .push((from.to_string(), to.to_string(), properties.clone()));
            Ok(())
        }

        fn downstream(&self, address: &str, _depth: u32) -> DataApiResult<Option<Value>> {
            let links = self.links.lock().unwrap();
            let targets: Vec<&str> = links
                .iter()
                .filter(|(from, _, _)| from == address)
                .map(|(_, to, _)| to.as_str())
                .collect();
            Ok(Some(json!(targets)))
        }

        fn upstream(&self, _address: &str, _depth: u32) -> DataApiResult<Option<Value>> {
            Ok(None)
        }
    }

    fn api_with(config: NamespaceConfig, collaborators: Collaborators) -> DataApi {
        let backend = Arc::new(MemoryBackend::new());
        let control = Arc::new(ApiMetadataStore::new(backend.clone(), params::CONTROL_TABLE));
        control.verify_control_table().unwrap();
        control.create_metadata(&config, "tester").unwrap();
        let metrics = Arc::new(MetricsRegistry::new());
        let schemas = Arc::new(SchemaValidationCache::new(control.clone(), metrics.clone()));
        let settings = DataApiSettings::default();
        let engine = StorageEngine::open(backend, config, &settings, schemas.clone(), metrics).unwrap();
        DataApi::new(engine, control, schemas, &settings, collaborators)
    }

    fn api() -> DataApi {
        api_with(NamespaceConfig::new("orders", "id"), Collaborators::default())
    }

    fn resource(value: Value) -> UpdateBody {
        UpdateBody::resource(value.as_object().cloned().unwrap())
    }

    #[test]
    fn test_get_by_key_and_address() {
        let api = api();
        api.update("A", resource(json!({"color": "red"})), "tester").unwrap();

        let by_key = api.get("A", MasterOption::ItemOnly, false).unwrap();
        let by_address = api.get(&api.address("A"), MasterOption::ItemOnly, false).unwrap();
        assert_eq!(by_key, by_address);
        assert_eq!(by_key.item.item_arn, "arn:aws:dapi:local:000000000000:orders-dev:A");
        assert_eq!(by_key.item.resource.as_ref().unwrap()["color"], json!("red"));
        assert!(by_key.master.is_none());

        let foreign = "arn:aws:dapi:local:000000000000:users-dev:A";
        assert_eq!(api.get(foreign, MasterOption::ItemOnly, false).unwrap_err().kind(), ErrorKind::ResourceNotFound);
    }

    #[test]
    fn test_get_master_options() {
        let api = api();
        api.update("M", resource(json!({"color": "blue"})), "tester").unwrap();
        api.update("A", resource(json!({"color": "red"})), "tester").unwrap();
        api.set_item_master(&["A".to_string()], "M", "tester").unwrap();

        let item_only = api.get("A", MasterOption::ItemOnly, false).unwrap();
        assert!(item_only.master.is_none());

        let include = api.get("A", MasterOption::Include, false).unwrap();
        let master = include.master.unwrap();
        assert_eq!(master.item_arn, api.address("M"));
        assert_eq!(master.resource.unwrap()["color"], json!("blue"));

        let prefer = api.get("A", MasterOption::Prefer, false).unwrap();
        assert_eq!(prefer.item.resource.as_ref().unwrap()["color"], json!("red"));
        let identity = prefer.master.unwrap();
        assert_eq!(identity.resource.unwrap(), json!({"id": "M"}).as_object().cloned().unwrap());

        // An unlinked item has no master under any option
        assert!(api.get("M", MasterOption::Include, false).unwrap().master.is_none());
    }

    #[test]
    fn test_update_rejects_item_master_field() {
        let api = api();
        let err = api
            .update("A", resource(json!({"color": "red", "ItemMasterID": "M"})), "tester")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArguments);
        assert!(api.check("A").is_err());
    }

    #[test]
    fn test_references_need_lineage() {
        let api = api();
        let body = UpdateBody::parse(json!({
            "Resource": {"color": "red"},
            "References": [{"Resource": "B"}]
        }))
        .unwrap();
        let err = api.update("A", body, "tester").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnimplementedFeature);
        assert!(api.check("A").is_err());
        assert_eq!(api.downstream("A", 1).unwrap_err().kind(), ErrorKind::UnimplementedFeature);
        assert_eq!(api.search(None, &json!({})).unwrap_err().kind(), ErrorKind::UnimplementedFeature);
        assert_eq!(api.export(&json!({})).unwrap_err().kind(), ErrorKind::UnimplementedFeature);
    }

    #[test]
    fn test_references_forwarded_to_lineage() {
        let lineage = Arc::new(RecordingLineage::default());
        let api = api_with(
            NamespaceConfig::new("orders", "id"),
            Collaborators::default().with_lineage(lineage.clone()),
        );
        let body = UpdateBody::parse(json!({
            "Resource": {"color": "red"},
            "References": [{"Resource": "B", "kind": "derived"}]
        }))
        .unwrap();
        api.update("A", body, "tester").unwrap();

        let links = lineage.links.lock().unwrap().clone();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].0, api.address("A"));
        assert_eq!(links[0].1, "B");
        assert_eq!(links[0].2["kind"], json!("derived"));
        assert_eq!(api.downstream("A", 1).unwrap(), Some(json!(["B"])));

        let malformed = UpdateBody::parse(json!({"References": [{"kind": "x"}]})).unwrap();
        assert_eq!(api.update("A", malformed, "tester").unwrap_err().kind(), ErrorKind::InvalidArguments);
    }

    #[test]
    fn test_find_addresses_items() {
        let api = api();
        api.update("A", resource(json!({"color": "red"})), "tester").unwrap();
        let meta = UpdateBody::parse(json!({"Metadata": {"owner": "ops"}})).unwrap();
        api.update("A", meta, "tester").unwrap();

        let by_resource = api
            .find(&FindRequest {
                resource: json!({"color": "red"}).as_object().cloned(),
                ..FindRequest::default()
            })
            .unwrap();
        assert_eq!(by_resource.items.len(), 1);
        assert_eq!(by_resource.items[0].item_arn, api.address("A"));

        let by_metadata = api
            .find(&FindRequest {
                metadata: json!({"owner": "ops"}).as_object().cloned(),
                ..FindRequest::default()
            })
            .unwrap();
        assert_eq!(by_metadata.items[0].item_arn, api.address("A"));
        assert!(by_metadata.items[0].resource.is_none());
    }

    #[test]
    fn test_schema_lifecycle_invalidates_cache() {
        let api = api();
        let schema = json!({"type": "object", "required": ["color"]});
        api.put_schema(SchemaKind::Resource, schema.clone(), "tester").unwrap();
        assert_eq!(api.get_schema(SchemaKind::Resource).unwrap(), Some(schema));

        let err = api.update("A", resource(json!({"size": 1})), "tester").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArguments);

        assert!(api.remove_schema("resource", "tester").unwrap());
        assert!(!api.remove_schema("Resource", "tester").unwrap());
        api.update("A", resource(json!({"size": 1})), "tester").unwrap();

        assert!(api.remove_schema("Other", "tester").is_err());
        assert!(api.put_schema(SchemaKind::Metadata, json!({"type": "nothing"}), "tester").is_err());
    }

    #[test]
    fn test_schema_stored_elsewhere_applies_within_hitcount() {
        let mut config = NamespaceConfig::new("orders", "id");
        config.schema_validation_refresh_hitcount = 2;
        let api = api_with(config, Collaborators::default());
        api.update("A", resource(json!({"size": 1})), "tester").unwrap();

        api.control
            .put_schema("orders-dev", SchemaKind::Resource, json!({"required": ["color"]}), "other")
            .unwrap();

        let accepted = (0..20)
            .filter(|n| api.update("A", resource(json!({"size": n})), "tester").is_ok())
            .count();
        assert!(accepted <= 1, "accepted {} writes after the schema was stored", accepted);
    }

    #[test]
    fn test_endpoints() {
        let mut config = NamespaceConfig::new("orders", "id");
        config.gremlin_address = Some("ws://graph:8182".to_string());
        config.search_config = Some(json!({"ElasticSearchDomain": {"ElasticSearchEndpoint": "search.local"}}));
        let api = api_with(config, Collaborators::default());
        let endpoints = api.endpoints().unwrap();
        assert_eq!(endpoints["GraphURL"], json!("ws://graph:8182"));
        assert_eq!(endpoints["Elasticsearch"], json!("search.local"));
        assert!(endpoints["ResourceStream"].is_string());

        let plain = self::api().endpoints().unwrap();
        assert!(plain.get("GraphURL").is_none());
    }

    #[test]
    fn test_usage_counts_both_tables() {
        let api = api();
        api.update("A", resource(json!({"color": "red"})), "tester").unwrap();
        api.update("B", resource(json!({"color": "blue"})), "tester").unwrap();
        let mut body = UpdateBody::default();
        body.metadata = json!({"owner": "ops"}).as_object().cloned();
        api.update("A", body, "tester").unwrap();

        let usage = api.usage().unwrap();
        assert_eq!(usage.resource.count, 2);
        assert_eq!(usage.metadata.count, 1);
        assert!(usage.resource.size_bytes > 0);
    }

    struct EchoSearch;

    impl SearchProvider for EchoSearch {
        fn search(&self, table: &str, kind: TableKind, query: &Value) -> DataApiResult<Value> {
            Ok(json!({"table": table, "metadata": kind == TableKind::Metadata, "query": query}))
        }
    }

    struct FixedExport;

    impl ExportProvider for FixedExport {
        fn start_export(&self, table: &str, _options: &Value) -> DataApiResult<Value> {
            Ok(json!({"JobName": format!("{}-export", table)}))
        }

        fn export_status(&self, job_name: &str, run_id: &str) -> DataApiResult<Value> {
            Ok(json!({"JobName": job_name, "RunId": run_id, "Status": "SUCCEEDED"}))
        }
    }

    #[test]
    fn test_collaborators_required() {
        let api = api();
        let query = json!({"match": {"color": "red"}});
        assert_eq!(api.search(None, &query).unwrap_err().kind(), ErrorKind::UnimplementedFeature);
        assert_eq!(api.export(&json!({})).unwrap_err().kind(), ErrorKind::UnimplementedFeature);
        assert_eq!(api.upstream("A", 1).unwrap_err().kind(), ErrorKind::UnimplementedFeature);
    }

    #[test]
    fn test_search_and_export_delegate() {
        let collaborators = Collaborators::default()
            .with_search(Arc::new(EchoSearch))
            .with_export(Arc::new(FixedExport));
        let api = api_with(NamespaceConfig::new("orders", "id"), collaborators);
        let query = json!({"match": {"color": "red"}});

        let both = api.search(None, &query).unwrap();
        assert_eq!(both["Resource"]["metadata"], json!(false));
        assert_eq!(both["Metadata"]["metadata"], json!(true));
        assert_eq!(both["Resource"]["query"], query);

        let metadata_only = api.search(Some(TableKind::Metadata), &query).unwrap();
        assert!(metadata_only.get("Resource").is_none());

        let jobs = api.export(&json!({})).unwrap();
        assert_eq!(jobs["Resource"]["JobName"], json!("orders-dev-export"));
        assert_eq!(jobs["Metadata"]["JobName"], json!("orders-dev-Metadata-export"));
        assert_eq!(api.export_status("j", "r").unwrap()["Status"], json!("SUCCEEDED"));
    }

    #[test]
    fn test_drop_namespace() {
        let api = api();
        api.update("A", resource(json!({"color": "red"})), "tester").unwrap();
        let backups = api.drop_namespace(true).unwrap();
        assert_eq!(backups.len(), 2);
        assert!(api.get_namespace_metadata(None).unwrap().is_none());
    }
}
