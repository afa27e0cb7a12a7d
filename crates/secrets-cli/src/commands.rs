use anyhow::{anyhow, bail, Context as _, Result};
use secrets_core::{
    Credential, FieldDefinition, KeyCache, Record, Schema, SearchOptions, Store, StoreError,
    StoreFile, StoreKey,
};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::config::Settings;
use crate::prompt::{self, Ask, ValueSource};
use crate::render::{self, RenderOptions, Row};
use crate::ViewArgs;

type Changes = Vec<(String, Zeroizing<String>)>;

pub struct GrepArgs {
    pub fields: Option<String>,
    pub case_sensitive: bool,
    pub color: bool,
}

/// What every command runs against: settings, where missing values come
/// from, and the key cache when enabled.
pub struct Context<'a> {
    settings: &'a Settings,
    source: &'a mut dyn ValueSource,
    cache: Option<&'a dyn KeyCache>,
}

impl<'a> Context<'a> {
    pub fn new(
        settings: &'a Settings,
        source: &'a mut dyn ValueSource,
        cache: Option<&'a dyn KeyCache>,
    ) -> Self {
        Self {
            settings,
            source,
            cache,
        }
    }

    fn store_file(&mut self, name: Option<String>) -> Result<StoreFile> {
        let name = match name {
            Some(name) => name,
            None => self.source.read_line("Store name: ")?,
        };
        self.settings.store_file(&name)
    }

    /// Open `file` with the configured key, else a cached key, else a
    /// prompted one.
    fn unlock(&mut self, file: &StoreFile) -> Result<(Store, StoreKey)> {
        if let Some(passphrase) = &self.settings.key {
            let opened = file.open(Credential::Passphrase(passphrase.as_str()))?;
            self.remember(file, &opened.1);
            return Ok(opened);
        }

        if let Some(cache) = self.cache {
            match cache.get(&file.identity()) {
                Ok(Some(key)) => match file.open(Credential::Key(&key)) {
                    Ok(opened) => {
                        debug!(store = %file.name(), "opened with cached key");
                        return Ok(opened);
                    }
                    Err(StoreError::Authentication) => {
                        debug!(store = %file.name(), "cached key rejected");
                        self.forget(file);
                    }
                    Err(e) => return Err(e.into()),
                },
                Ok(None) => {}
                Err(e) => warn!("key cache unavailable: {e}"),
            }
        }

        if !file.exists() {
            return Err(StoreError::PathNotFound(file.path().to_path_buf()).into());
        }
        let passphrase = prompt::ask_key(&mut *self.source, "Store key")?;
        let opened = file.open(Credential::Passphrase(passphrase.as_str()))?;
        self.remember(file, &opened.1);
        Ok(opened)
    }

    fn remember(&self, file: &StoreFile, key: &StoreKey) {
        if let Some(cache) = self.cache {
            if let Err(e) = cache.put(&file.identity(), key) {
                warn!("cannot cache store key: {e}");
            }
        }
    }

    fn forget(&self, file: &StoreFile) {
        if let Some(cache) = self.cache {
            if let Err(e) = cache.invalidate(&file.identity()) {
                warn!("cannot drop cached store key: {e}");
            }
        }
    }
}

pub fn list(ctx: &Context<'_>) -> Result<()> {
    let dir = &ctx.settings.stores_dir;
    if !dir.exists() {
        warn!("stores directory {} does not exist", dir.display());
    }
    for name in StoreFile::list(dir)? {
        println!("{name}");
    }
    Ok(())
}

pub fn create(ctx: &mut Context<'_>, store: Option<String>, fields: Option<String>) -> Result<()> {
    let file = ctx.store_file(store)?;
    if file.exists() {
        return Err(StoreError::PathExists(file.path().to_path_buf()).into());
    }
    let schema = match fields {
        Some(fields) => Schema::parse(&fields)?,
        None => ask_fields(&mut *ctx.source)?,
    };
    let passphrase = match &ctx.settings.key {
        Some(key) => key.clone(),
        None => prompt::ask(&mut *ctx.source, "Store key", Ask::secret())?,
    };
    file.create(schema, &passphrase, ctx.settings.kdf)
        .with_context(|| format!("cannot create store '{}'", file.name()))?;
    Ok(())
}

pub fn destroy(ctx: &mut Context<'_>, store: Option<String>) -> Result<()> {
    let file = ctx.store_file(store)?;
    file.destroy()
        .with_context(|| format!("cannot destroy store '{}'", file.name()))?;
    ctx.forget(&file);
    Ok(())
}

pub fn change_key(ctx: &mut Context<'_>, store: Option<String>, new_key: Option<String>) -> Result<()> {
    let file = ctx.store_file(store)?;
    let (_, key) = ctx.unlock(&file)?;
    let new_key = match new_key {
        Some(new_key) => Zeroizing::new(new_key),
        None => prompt::ask(&mut *ctx.source, "New store key", Ask::secret())?,
    };
    file.rotate_key(Credential::Key(&key), &new_key, ctx.settings.kdf, ctx.cache)
        .with_context(|| format!("cannot change key of store '{}'", file.name()))?;
    Ok(())
}

pub fn clear(ctx: &mut Context<'_>, store: Option<String>) -> Result<()> {
    let file = ctx.store_file(store)?;
    let (mut store, key) = ctx.unlock(&file)?;
    let removed = store.clear();
    file.save(&store, &key)
        .with_context(|| format!("cannot clear store '{}'", file.name()))?;
    info!(removed, "store cleared");
    Ok(())
}

pub fn show(ctx: &mut Context<'_>, store: Option<String>, view: &ViewArgs) -> Result<()> {
    let file = ctx.store_file(store)?;
    let (store, _) = ctx.unlock(&file)?;
    let rows: Vec<Row> = view_order(&store, view)?
        .into_iter()
        .map(Row::from)
        .collect();
    print!(
        "{}",
        render::render(
            store.schema(),
            &rows,
            RenderOptions {
                table: !view.no_table,
                when: view.when,
                color: false,
            },
        )
    );
    Ok(())
}

pub fn grep(
    ctx: &mut Context<'_>,
    store: Option<String>,
    pattern: Option<String>,
    args: GrepArgs,
    view: &ViewArgs,
) -> Result<()> {
    let file = ctx.store_file(store)?;
    let (store, _) = ctx.unlock(&file)?;
    let pattern = match pattern {
        Some(pattern) => pattern,
        None => ctx.source.read_line("Search pattern: ")?,
    };

    let mut options = SearchOptions::default().ignore_case(!args.case_sensitive);
    if let Some(fields) = &args.fields {
        options = options.fields(split_list(fields));
    }
    let mut hits = store.search_with(&pattern, &options)?;
    debug!(matches = hits.len(), "search done");

    let rank: HashMap<u64, usize> = view_order(&store, view)?
        .iter()
        .enumerate()
        .map(|(position, record)| (record.id, position))
        .collect();
    hits.sort_by_key(|hit| rank.get(&hit.record.id).copied().unwrap_or(usize::MAX));

    let rows: Vec<Row> = hits.iter().map(Row::from).collect();
    print!(
        "{}",
        render::render(
            store.schema(),
            &rows,
            RenderOptions {
                table: !view.no_table,
                when: view.when,
                color: args.color,
            },
        )
    );
    Ok(())
}

pub fn add(ctx: &mut Context<'_>, store: Option<String>, data: Option<String>) -> Result<()> {
    let file = ctx.store_file(store)?;
    let (mut store, key) = ctx.unlock(&file)?;
    let values = collect_values(store.schema(), data.as_deref(), &mut *ctx.source)?;
    let id = store
        .add(values.iter().map(|(name, value)| (name.as_str(), value.as_str())))
        .with_context(|| format!("cannot add secret to store '{}'", file.name()))?;
    file.save(&store, &key)?;
    info!(id, "secret added");
    Ok(())
}

pub fn remove(ctx: &mut Context<'_>, store: Option<String>, ids: Vec<String>) -> Result<()> {
    let file = ctx.store_file(store)?;
    let (mut store, key) = ctx.unlock(&file)?;
    let raw = if ids.is_empty() {
        vec![ctx.source.read_line("ID of the secret(s) to remove: ")?]
    } else {
        ids
    };
    let ids = parse_ids(&raw)?;
    store
        .remove(&ids)
        .with_context(|| format!("cannot remove secrets from store '{}'", file.name()))?;
    file.save(&store, &key)?;
    Ok(())
}

pub fn modify(
    ctx: &mut Context<'_>,
    store: Option<String>,
    id: Option<u64>,
    data: Option<String>,
) -> Result<()> {
    let file = ctx.store_file(store)?;
    let (mut store, key) = ctx.unlock(&file)?;
    let id = match id {
        Some(id) => id,
        None => parse_id(&ctx.source.read_line("ID of the secret to modify: ")?)?,
    };
    let changes = match data {
        Some(data) => parse_data(&data)?,
        None => ask_change(&store, id, &mut *ctx.source)?,
    };
    store
        .modify(id, changes.iter().map(|(name, value)| (name.as_str(), value.as_str())))
        .with_context(|| format!("cannot modify secret {id} of store '{}'", file.name()))?;
    file.save(&store, &key)?;
    Ok(())
}

/// Records in display order: insertion order unless a sort field is given.
fn view_order<'s>(store: &'s Store, view: &ViewArgs) -> Result<Vec<&'s Record>> {
    match &view.sort {
        Some(field) => Ok(store.sorted(field, view.reverse)?),
        None => {
            let mut records: Vec<&Record> = store.records().iter().collect();
            if view.reverse {
                records.reverse();
            }
            Ok(records)
        }
    }
}

fn ask_fields(source: &mut dyn ValueSource) -> Result<Schema> {
    eprintln!(
        "Insert store fields with format <name>[+<attributes>]; \
         attributes: m (mandatory), h (hidden). Leave empty to finish."
    );
    let mut fields = Vec::new();
    loop {
        let line = source.read_line(&format!("Field {}: ", fields.len() + 1))?;
        if line.trim().is_empty() {
            break;
        }
        fields.push(FieldDefinition::parse(&line)?);
    }
    Ok(Schema::new(fields)?)
}

/// Values for a new secret. With `--data`, only mandatory fields it leaves out
/// are asked for; without it, every field is.
fn collect_values(schema: &Schema, data: Option<&str>, source: &mut dyn ValueSource) -> Result<Changes> {
    let mut values = match data {
        Some(data) => parse_data(data)?,
        None => Vec::new(),
    };
    let ask_all = data.is_none();
    for field in schema.fields() {
        let given = values
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case(&field.name));
        if given || !(ask_all || field.mandatory) {
            continue;
        }
        let how = Ask::visible()
            .hidden(field.hidden)
            .required(field.mandatory);
        let value = prompt::ask(source, &field.name, how)?;
        if !value.is_empty() {
            values.push((field.name.clone(), value));
        }
    }
    Ok(values)
}

fn ask_change(store: &Store, id: u64, source: &mut dyn ValueSource) -> Result<Changes> {
    let record = store
        .get(id)
        .ok_or_else(|| StoreError::NotFound(vec![id]))?;
    let fields = store.schema().fields();
    eprintln!("Which field to modify?");
    for (index, field) in fields.iter().enumerate() {
        match record.value(&field.name) {
            Some(value) if field.hidden => {
                eprintln!("{index}) {} ({})", field.name, "*".repeat(value.chars().count()))
            }
            Some(value) => eprintln!("{index}) {} ({value})", field.name),
            None => eprintln!("{index}) {}", field.name),
        }
    }
    let choice = source.read_line("Field: ")?;
    let field = match choice.trim().parse::<usize>() {
        Ok(index) => fields
            .get(index)
            .ok_or_else(|| anyhow!("no field number {index}"))?,
        Err(_) => store.schema().resolve(&choice)?,
    };
    let how = Ask::visible()
        .hidden(field.hidden)
        .required(field.mandatory);
    let value = prompt::ask(source, &format!("New value of '{}'", field.name), how)?;
    Ok(vec![(field.name.clone(), value)])
}

/// `Field=value,Field=value`
fn parse_data(data: &str) -> Result<Changes> {
    let mut values = Vec::new();
    for (position, entry) in data.split(',').enumerate() {
        if entry.trim().is_empty() {
            continue;
        }
        let (name, value) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("data entry {} is not in Field=value form", position + 1))?;
        values.push((name.trim().to_string(), Zeroizing::new(value.to_string())));
    }
    if values.is_empty() {
        bail!("no Field=value pairs given");
    }
    Ok(values)
}

/// Ids separated by whitespace and/or commas, across one or more arguments.
fn parse_ids(raw: &[String]) -> Result<Vec<u64>> {
    let ids = raw
        .iter()
        .flat_map(|arg| split_list(arg))
        .map(|token| parse_id(&token))
        .collect::<Result<Vec<u64>>>()?;
    if ids.is_empty() {
        bail!("no secret id given");
    }
    Ok(ids)
}

fn parse_id(raw: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .map_err(|_| anyhow!("invalid secret id '{}'", raw.trim()))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}
