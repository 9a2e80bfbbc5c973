//! `(( static_ips 0 1 2 ))` / `(( static_ips "z1:0" "z2:0" ))`
//!
//! Only valid at `jobs.<job>.networks.<n>.static_ips` (or the same below
//! `instance_groups`). The network named by the job's network entry is looked
//! up in the root `networks` list. Its subnets contribute the addresses
//! listed under `static` (single addresses, `a - b` ranges or CIDRs) to the
//! pool, in order.
//!
//! A plain offset indexes the pool of every subnet the job can be placed in.
//! `az:offset` indexes only the addresses of subnets in that availability
//! zone, which must be one of the job's `azs`.
//!
//! Each instance of the job gets one address. Allocations are recorded in
//! the run state; an address handed to two different instances is an error.
use super::ips::{ip_string, IpRange};
use super::{resolve_arg, Operator, Response};
use crate::cursor::Cursor;
use crate::error::Error;
use crate::evaluator::Evaluator;
use crate::expr::Expr;
use crate::value::Value;
use indexmap::IndexMap;

pub struct StaticIps;

impl Operator for StaticIps {
    fn setup(&self, ev: &mut Evaluator) -> Result<(), Error> {
        ev.state.ips.clear();
        Ok(())
    }

    fn dependencies(
        &self,
        ev: &Evaluator,
        _args: &[Expr],
        _locations: &[Cursor],
        auto: &[Cursor],
    ) -> Vec<Cursor> {
        let mut deps = auto.to_vec();
        if let Some(site) = CallSite::locate(&ev.here) {
            deps.extend([
                site.job.child("name"),
                site.job.child("instances"),
                site.job.child("azs"),
                site.network_entry.child("name"),
                Cursor {
                    nodes: vec!["networks".into()],
                },
            ]);
        }
        deps
    }

    fn run(&self, ev: &mut Evaluator, args: &[Expr]) -> Result<Response, Error> {
        let site = CallSite::locate(&ev.here).ok_or_else(|| {
            Error::msg(format!(
                "static_ips operator only works inside networks of jobs or instance_groups, found at {}",
                ev.here.rooted()
            ))
        })?;

        let job = Job::read(&ev.tree, &site)?;
        let pool = Pool::read(&ev.tree, &job, ev.merge_key())?;

        if args.len() < job.instances {
            return Err(Error::msg(format!(
                "static_ips: job `{}` has {} instance(s) but only {} static IP offset(s) were requested",
                job.name,
                job.instances,
                args.len()
            )));
        }

        let mut addresses = vec![];
        for (instance, arg) in args.iter().take(job.instances).enumerate() {
            let (zone, offset) = offset_arg(ev, arg)?;
            let ip = match &zone {
                Some(zone) => {
                    if !job.azs.is_empty() && !job.azs.contains(zone) {
                        return Err(Error::msg(format!(
                            "static_ips: job `{}` is not deployed to availability zone `{zone}`",
                            job.name
                        )));
                    }
                    let ranges = pool.zones.get(zone).map(Vec::as_slice).unwrap_or_default();
                    pick(ranges, offset)?
                }
                None => pick(&pool.all, offset)?,
            };

            let owner = format!("{}/{}/{instance}", job.network, job.name);
            if let Some(existing) = ev.state.ips.get(&ip).filter(|existing| **existing != owner) {
                return Err(Error::msg(format!(
                    "static_ips: {} is already allocated to {existing}, cannot assign it to {owner}",
                    ip_string(ip)
                )));
            }
            ev.state.ips.entry(ip).or_insert(owner);

            addresses.push(Value::String(ip_string(ip)));
        }

        tracing::debug!(here = %ev.here, job = %job.name, count = addresses.len(), "allocated static ips");
        Ok(Response::Replace(Value::Array(addresses)))
    }
}

/// Where a static_ips call sits
struct CallSite {
    job: Cursor,
    network_entry: Cursor,
}

impl CallSite {
    fn locate(here: &Cursor) -> Option<Self> {
        let group = here.component(0);
        let valid = here.len() == 5
            && (group == "jobs" || group == "instance_groups")
            && here.component(2) == "networks"
            && here.component(4) == "static_ips";
        if !valid {
            return None;
        }

        Some(Self {
            job: Cursor {
                nodes: here.nodes[..2].to_vec(),
            },
            network_entry: here.up(),
        })
    }
}

struct Job {
    name: String,
    instances: usize,
    azs: Vec<String>,
    network: String,
}

impl Job {
    fn read(tree: &Value, site: &CallSite) -> Result<Self, Error> {
        let name = scalar_at(tree, &site.job.child("name"))?;
        let network = scalar_at(tree, &site.network_entry.child("name"))?;

        let instances_at = site.job.child("instances");
        let instances = match instances_at.resolve(tree)? {
            Value::Integer(n) if *n >= 0 => *n as usize,
            other => return Err(Error::type_mismatch(&instances_at, "a non-negative integer", other.kind())),
        };

        let azs_at = site.job.child("azs");
        let azs = match azs_at.resolve(tree) {
            Ok(value) => string_list(value, &azs_at)?,
            Err(err) if err.is_not_found() => vec![],
            Err(err) => return Err(err),
        };

        Ok(Self {
            name,
            instances,
            azs,
            network,
        })
    }
}

/// Addresses available to a job, overall and per availability zone
struct Pool {
    all: Vec<IpRange>,
    zones: IndexMap<String, Vec<IpRange>>,
}

impl Pool {
    fn read(tree: &Value, job: &Job, merge_key: Option<&str>) -> Result<Self, Error> {
        let network_at = Cursor {
            nodes: vec!["networks".into(), job.network.clone()],
        };
        let subnets_at = network_at.canonical_with(tree, merge_key)?.child("subnets");
        let subnets = match subnets_at.resolve(tree)? {
            Value::Array(subnets) => subnets,
            other => return Err(Error::type_mismatch(&subnets_at, "a list of subnets", other.kind())),
        };

        let mut pool = Pool {
            all: vec![],
            zones: IndexMap::new(),
        };

        for (index, subnet) in subnets.iter().enumerate() {
            let subnet_at = subnets_at.child(index.to_string());
            let Some(subnet) = subnet.as_object() else {
                return Err(Error::type_mismatch(&subnet_at, "a subnet map", subnet.kind()));
            };

            let mut zones = match subnet.get("azs") {
                Some(azs) => string_list(azs, &subnet_at.child("azs"))?,
                None => vec![],
            };
            if let Some(az) = subnet.get("az").and_then(Value::to_scalar_string) {
                zones.push(az);
            }

            let static_at = subnet_at.child("static");
            let entries = match subnet.get("static") {
                None | Some(Value::Null) => continue,
                Some(Value::Array(entries)) => entries.clone(),
                Some(Value::String(entry)) => vec![Value::String(entry.clone())],
                Some(other) => return Err(Error::type_mismatch(&static_at, "a list of addresses", other.kind())),
            };

            let mut ranges = vec![];
            for (i, entry) in entries.iter().enumerate() {
                let text = entry.as_str().ok_or_else(|| {
                    Error::type_mismatch(&static_at.child(i.to_string()), "an address or a range", entry.kind())
                })?;
                ranges.push(IpRange::parse(text).map_err(|err| err.at(&static_at.child(i.to_string())))?);
            }

            let eligible = job.azs.is_empty() || zones.is_empty() || zones.iter().any(|z| job.azs.contains(z));
            if eligible {
                pool.all.extend(ranges.iter().copied());
            }
            for zone in zones {
                pool.zones.entry(zone).or_default().extend(ranges.iter().copied());
            }
        }

        Ok(pool)
    }
}

fn pick(ranges: &[IpRange], offset: u64) -> Result<u32, Error> {
    let mut remaining = offset;
    for range in ranges {
        match range.get(remaining) {
            Some(ip) => return Ok(ip),
            None => remaining -= range.len(),
        }
    }

    let size: u64 = ranges.iter().map(IpRange::len).sum();
    Err(Error::msg(format!(
        "request for static_ip({offset}) in a pool of only {size} (zero-indexed) static addresses"
    )))
}

/// `3` or `"z1:3"`
fn offset_arg(ev: &Evaluator, arg: &Expr) -> Result<(Option<String>, u64), Error> {
    let invalid = || Error::msg(format!("static_ips: {arg} is not an offset or an `az:offset` pair"));

    let (zone, offset) = match resolve_arg(ev, arg)? {
        (_, Value::Integer(offset)) => (None, offset),
        (_, Value::String(text)) => match text.split_once(':') {
            Some((zone, offset)) => (
                Some(zone.trim().to_string()),
                offset.trim().parse::<i64>().map_err(|_| invalid())?,
            ),
            None => (None, text.trim().parse::<i64>().map_err(|_| invalid())?),
        },
        _ => return Err(invalid()),
    };

    let offset = u64::try_from(offset)
        .map_err(|_| Error::msg(format!("static_ips: offset {offset} must not be negative")))?;
    Ok((zone, offset))
}

fn scalar_at(tree: &Value, at: &Cursor) -> Result<String, Error> {
    let value = at.resolve(tree)?;
    value
        .to_scalar_string()
        .ok_or_else(|| Error::type_mismatch(at, "a scalar", value.kind()))
}

fn string_list(value: &Value, at: &Cursor) -> Result<Vec<String>, Error> {
    let Value::Array(list) = value else {
        return Err(Error::type_mismatch(at, "a list", value.kind()));
    };
    list.iter()
        .map(|entry| entry.to_scalar_string().ok_or_else(|| Error::type_mismatch(at, "a list of names", "nested structure")))
        .collect()
}
