// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod error;

use {
    crate::error::ToolError,
    chrono::TimeZone,
    clap::{Arg, ArgMatches, Command},
    dbpf_data::DataResource,
    dbpf_package::{IndexEntry, Package, PackageOptions, ResourceKey},
    log::{info, warn, LevelFilter},
    std::{collections::BTreeMap, io::Write, path::Path, str::FromStr},
};

const KEY_HELP: &str = "Resource key, as TTTTTTTT:GGGGGGGG:IIIIIIIIIIIIIIII (hex)";

fn read_only_options() -> PackageOptions {
    let mut options = PackageOptions::default();
    options.set_read_only(true);

    options
}

fn parse_hex_u32(what: &'static str, value: &str) -> Result<u32, ToolError> {
    let digits = value
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X");

    u32::from_str_radix(digits, 16).map_err(|_| ToolError::BadArgument(what, value.to_string()))
}

fn parse_key(value: &str) -> Result<ResourceKey, ToolError> {
    ResourceKey::from_str(value).map_err(|_| ToolError::BadArgument("resource key", value.to_string()))
}

fn required<'a>(args: &'a ArgMatches, name: &'static str) -> Result<&'a str, ToolError> {
    args.value_of(name)
        .ok_or_else(|| ToolError::BadArgument(name, "missing".to_string()))
}

fn format_timestamp(value: u32) -> String {
    if value == 0 {
        return "unset".to_string();
    }

    chrono::Utc
        .timestamp_opt(value as i64, 0)
        .single()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| value.to_string())
}

fn command_info(args: &ArgMatches) -> Result<(), ToolError> {
    let path = required(args, "path")?;
    let package = Package::open_with_options(path, read_only_options())?;
    let header = package.header();

    println!("format version: {}.{}", header.major_version, header.minor_version);
    println!(
        "user version: {}.{}",
        header.user_major_version, header.user_minor_version
    );
    println!("created: {}", format_timestamp(header.created));
    println!("modified: {}", format_timestamp(header.modified));
    println!(
        "index version: {}.{}",
        header.index_major_version, header.index_minor_version
    );
    println!("index type: {:#x}", package.index_type());
    println!(
        "index: {} bytes at offset {}",
        header.index_size, header.index_position
    );
    println!("resources: {}", package.len());

    let mut types = BTreeMap::<u32, (usize, u64, u64)>::new();
    for entry in package.entries() {
        let stats = types.entry(entry.key.resource_type).or_default();
        stats.0 += 1;
        stats.1 += entry.file_size as u64;
        stats.2 += entry.memory_size as u64;
    }

    for (resource_type, (count, stored, decoded)) in types {
        println!(
            "  {:08X}: {} resources, {} bytes stored, {} bytes decompressed",
            resource_type, count, stored, decoded
        );
    }

    Ok(())
}

fn command_list(args: &ArgMatches) -> Result<(), ToolError> {
    let path = required(args, "path")?;
    let type_filter = args
        .value_of("type")
        .map(|v| parse_hex_u32("--type", v))
        .transpose()?;
    let group_filter = args
        .value_of("group")
        .map(|v| parse_hex_u32("--group", v))
        .transpose()?;

    let package = Package::open_with_options(path, read_only_options())?;

    let mut entries: Vec<IndexEntry> = match (type_filter, group_filter) {
        (Some(resource_type), _) => package.by_type(resource_type).copied().collect(),
        (None, Some(group)) => package.by_group(group).copied().collect(),
        (None, None) => package.entries().copied().collect(),
    };
    if let Some(group) = group_filter {
        entries.retain(|e| e.key.group == group);
    }
    entries.sort_by_key(|e| e.key);

    for entry in entries {
        println!(
            "{} {:>10} {:>10} {}",
            entry.key,
            entry.file_size,
            entry.memory_size,
            if entry.is_compressed() {
                "compressed"
            } else {
                "stored"
            }
        );
    }

    Ok(())
}

fn command_extract(args: &ArgMatches) -> Result<(), ToolError> {
    let path = required(args, "path")?;
    let key = parse_key(required(args, "key")?)?;

    let mut package = Package::open_with_options(path, read_only_options())?;
    let data = package
        .raw_bytes(&key)?
        .ok_or(ToolError::ResourceNotFound(key))?;

    match args.value_of("output") {
        Some(output) => {
            std::fs::write(output, &data)?;
            info!("wrote {} bytes to {}", data.len(), output);
        }
        None => {
            std::io::stdout().write_all(&data)?;
        }
    }

    Ok(())
}

fn command_add(args: &ArgMatches) -> Result<(), ToolError> {
    let path = required(args, "path")?;
    let key = parse_key(required(args, "key")?)?;
    let data = std::fs::read(required(args, "input")?)?;

    let mut package = if Path::new(path).exists() {
        Package::open(path)?
    } else {
        info!("creating new package {}", path);
        Package::new()
    };

    let entry = package.add_resource(key, data, args.is_present("compress"))?;
    package.save_to_path(path)?;

    println!(
        "added {} ({} bytes stored, {} bytes decompressed)",
        key, entry.file_size, entry.memory_size
    );

    Ok(())
}

fn command_remove(args: &ArgMatches) -> Result<(), ToolError> {
    let path = required(args, "path")?;
    let mut package = Package::open(path)?;

    let mut removed = 0;
    for value in args.values_of("keys").into_iter().flatten() {
        let key = parse_key(value)?;

        if package.remove_resource(&key)? {
            removed += 1;
        } else {
            warn!("resource {} is not present", key);
        }
    }

    if package.is_dirty() {
        package.save_to_path(path)?;
    }

    println!("removed {} resources", removed);

    Ok(())
}

fn command_compact(args: &ArgMatches) -> Result<(), ToolError> {
    let path = required(args, "path")?;
    let output = args.value_of("output").unwrap_or(path);

    let before = std::fs::metadata(path)?.len();
    let mut package = Package::open(path)?;
    package.compact_to_path(output)?;
    let after = std::fs::metadata(output)?.len();

    println!(
        "compacted {} resources: {} -> {} bytes",
        package.len(),
        before,
        after
    );

    Ok(())
}

fn print_data_resource(resource: &DataResource) -> Result<(), ToolError> {
    println!("version: {:#x}", resource.version);

    println!("structures: {}", resource.structures.len());
    for (i, structure) in resource.structures.iter().enumerate() {
        println!(
            "  [{}] {} (hash {:08x}, size {})",
            i,
            structure.name.as_deref().unwrap_or("<unnamed>"),
            structure.name_hash,
            structure.size
        );

        for field in &structure.fields {
            println!(
                "      {} {} at {}",
                field.name.as_deref().unwrap_or("<unnamed>"),
                field.data_type,
                field.data_offset
            );
        }
    }

    println!("entries: {}", resource.entries.len());
    for entry in &resource.entries {
        println!(
            "  {}: {} (structure {}, {} elements, {} bytes)",
            entry.display_name(),
            entry.data_type,
            resource
                .structure_of(entry)
                .and_then(|s| s.name.as_deref())
                .unwrap_or("-"),
            entry.field_count,
            entry.field_size()
        );

        if entry.data_type.is_primitive() {
            for value in entry.values()? {
                println!("      {:?}", value);
            }
        }
    }

    Ok(())
}

fn command_data(args: &ArgMatches) -> Result<(), ToolError> {
    let path = required(args, "path")?;
    let key = parse_key(required(args, "key")?)?;

    let mut package = Package::open_with_options(path, read_only_options())?;
    let data = package
        .raw_bytes(&key)?
        .ok_or(ToolError::ResourceNotFound(key))?;

    if !DataResource::sniff(&data) {
        return Err(ToolError::NotDataResource(key));
    }

    print_data_resource(&DataResource::parse(&data)?)
}

fn main_impl() -> Result<(), ToolError> {
    let app = Command::new("dbpf")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Inspect and edit DBPF resource packages")
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .multiple_occurrences(true)
                .help("Increase logging verbosity. Can be specified multiple times."),
        );

    let path_arg = Arg::new("path")
        .required(true)
        .help("Path to package file");

    let app = app.subcommand(
        Command::new("info")
            .about("Print the package header and a summary of its resources")
            .arg(path_arg.clone()),
    );

    let app = app.subcommand(
        Command::new("list")
            .about("List resources in a package")
            .arg(path_arg.clone())
            .arg(
                Arg::new("type")
                    .long("type")
                    .takes_value(true)
                    .help("Only list resources of this type (hex)"),
            )
            .arg(
                Arg::new("group")
                    .long("group")
                    .takes_value(true)
                    .help("Only list resources in this group (hex)"),
            ),
    );

    let app = app.subcommand(
        Command::new("extract")
            .about("Write the decompressed content of a resource")
            .arg(path_arg.clone())
            .arg(Arg::new("key").required(true).help(KEY_HELP))
            .arg(
                Arg::new("output")
                    .long("output")
                    .short('o')
                    .takes_value(true)
                    .help("File to write to. Defaults to stdout"),
            ),
    );

    let app = app.subcommand(
        Command::new("add")
            .about("Add or replace a resource, creating the package if needed")
            .arg(path_arg.clone())
            .arg(Arg::new("key").required(true).help(KEY_HELP))
            .arg(
                Arg::new("input")
                    .required(true)
                    .help("File holding the resource content"),
            )
            .arg(
                Arg::new("compress")
                    .long("compress")
                    .help("Store the resource compressed if that makes it smaller"),
            ),
    );

    let app = app.subcommand(
        Command::new("remove")
            .about("Remove resources from a package")
            .arg(path_arg.clone())
            .arg(
                Arg::new("keys")
                    .required(true)
                    .multiple_values(true)
                    .help(KEY_HELP),
            ),
    );

    let app = app.subcommand(
        Command::new("compact")
            .about("Rewrite a package without unreferenced data")
            .arg(path_arg.clone())
            .arg(
                Arg::new("output")
                    .long("output")
                    .short('o')
                    .takes_value(true)
                    .help("Write the compacted package here instead of in place"),
            ),
    );

    let app = app.subcommand(
        Command::new("data")
            .about("Print the content of a DATA resource")
            .arg(path_arg)
            .arg(Arg::new("key").required(true).help(KEY_HELP)),
    );

    let matches = app.get_matches();

    let log_level = match matches.occurrences_of("verbose") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level.as_str()),
    );

    // Disable log context except at higher log levels.
    if log_level <= LevelFilter::Info {
        builder
            .format_timestamp(None)
            .format_level(false)
            .format_target(false);
    }

    builder.init();

    match matches.subcommand() {
        Some(("add", args)) => command_add(args),
        Some(("compact", args)) => command_compact(args),
        Some(("data", args)) => command_data(args),
        Some(("extract", args)) => command_extract(args),
        Some(("info", args)) => command_info(args),
        Some(("list", args)) => command_list(args),
        Some(("remove", args)) => command_remove(args),
        _ => Err(ToolError::UnknownCommand),
    }
}

fn main() {
    let exit_code = match main_impl() {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("Error: {}", err);
            1
        }
    };

    std::process::exit(exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_arguments() -> Result<(), ToolError> {
        assert_eq!(parse_hex_u32("--type", "0x0166038C")?, 0x0166_038c);
        assert_eq!(parse_hex_u32("--type", "ff")?, 0xff);
        assert!(matches!(
            parse_hex_u32("--group", "nope"),
            Err(ToolError::BadArgument("--group", _))
        ));

        assert_eq!(
            parse_key("00000001:00000002:0000000000000003")?,
            ResourceKey::new(1, 2, 3)
        );
        assert!(parse_key("1:2").is_err());

        Ok(())
    }

    #[test]
    fn timestamps() {
        assert_eq!(format_timestamp(0), "unset");
        assert_eq!(format_timestamp(86400), "1970-01-02T00:00:00+00:00");
    }
}
