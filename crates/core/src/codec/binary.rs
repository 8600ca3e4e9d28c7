//! Compact binary form of action and result trees
//!
//! ## Format (Version 0x01)
//!
//! ```text
//! [Version: u8]
//! [Payload Kind: u8]            ('A' = actions, 'R' = results)
//! [Node Count: u32 LE]
//! For each action node:
//!   [ActionId: u32 LE]
//!   [Type: u8]
//!   [EntityFullName: string]
//!   [ProviderName: string]
//!   [Has Parameters: u8] [Count: u32 LE] [Parameter]*
//!   [Has Conditional: u8] [Conditional]
//!   [Has Query: u8] [Query]
//!   [Has StoredProcedureName: u8] [string]
//!   [Has RowVersion: u8] [u64 LE]
//!   [CommandTimeout: u32 LE]
//!   [Has BeforeActions: u8] [Count: u32 LE] [Action]*
//!   [Has AfterActions: u8] [Count: u32 LE] [Action]*
//!   [Has AlternativeActions: u8] [Count: u32 LE] [Action]*
//! For each result node:
//!   [ActionId: u32 LE]
//!   [Success: u8]
//!   [Has FailureMessage: u8] [string]
//!   [AffectedRows: u64 LE]
//!   [RowVersion: u64 LE]
//!   [Has Parameters: u8] [Count: u32 LE] [Parameter]*
//!   [Has Result: u8] [Value]
//!   [Has BeforeActions: u8] [Count: u32 LE] [Result]*
//!   [Has AfterActions: u8] [Count: u32 LE] [Result]*
//!   [Has AlternativeActions: u8] [Count: u32 LE] [Result]*
//!
//! string    = [Length: u32 LE] [UTF-8 bytes]
//! Parameter = [Name: string] [Direction: u8] [Value]
//! Value     = [Tag: u8] [payload per tag]
//! ```
//!
//! Child collections are always written with the has-value flag set. A flag of
//! 0 is accepted on read and decodes to an empty collection.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use super::MAX_DECODE_DEPTH;
use crate::action::{
    ActionId, ActionNode, ActionType, ComparisonOperator, Conditional, LogicalOperator, Parameter,
    ParameterDirection, QueryInfo,
};
use crate::error::{Error, Result};
use crate::result::ResultNode;
use crate::value::{Value, ValueKind};

/// Binary format version
pub const BINARY_FORMAT_VERSION: u8 = 0x01;

const KIND_ACTIONS: u8 = b'A';
const KIND_RESULTS: u8 = b'R';

const COND_CONDITION: u8 = 0;
const COND_GROUP: u8 = 1;
const COND_NOT: u8 = 2;

/// Upper bound on speculative preallocation for decoded collections
const MAX_PREALLOC: usize = 1024;

// =============================================================================
// Public API
// =============================================================================

/// Encode a flat array of action trees
pub fn encode_actions(actions: &[ActionNode]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_header(&mut buf, KIND_ACTIONS, actions.len())?;
    for action in actions {
        write_action(&mut buf, action)?;
    }
    Ok(buf)
}

/// Decode a flat array of action trees produced by [`encode_actions`]
pub fn decode_actions(bytes: &[u8]) -> Result<Vec<ActionNode>> {
    let mut reader = bytes;
    let count = read_header(&mut reader, KIND_ACTIONS)?;
    let mut actions = Vec::with_capacity(count.min(MAX_PREALLOC));
    for _ in 0..count {
        actions.push(read_action(&mut reader, 0)?);
    }
    ensure_consumed(reader)?;
    Ok(actions)
}

/// Encode a flat array of result trees
pub fn encode_results(results: &[ResultNode]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_header(&mut buf, KIND_RESULTS, results.len())?;
    for result in results {
        write_result(&mut buf, result)?;
    }
    Ok(buf)
}

/// Decode a flat array of result trees produced by [`encode_results`]
pub fn decode_results(bytes: &[u8]) -> Result<Vec<ResultNode>> {
    let mut reader = bytes;
    let count = read_header(&mut reader, KIND_RESULTS)?;
    let mut results = Vec::with_capacity(count.min(MAX_PREALLOC));
    for _ in 0..count {
        results.push(read_result(&mut reader, 0)?);
    }
    ensure_consumed(reader)?;
    Ok(results)
}

// =============================================================================
// Header
// =============================================================================

fn write_header<W: Write>(w: &mut W, kind: u8, count: usize) -> Result<()> {
    w.write_u8(BINARY_FORMAT_VERSION)?;
    w.write_u8(kind)?;
    write_len(w, count)
}

fn read_header<R: Read>(r: &mut R, expected_kind: u8) -> Result<usize> {
    let version = r.read_u8()?;
    if version != BINARY_FORMAT_VERSION {
        return Err(Error::Corruption(format!(
            "unsupported binary format version {:#04x}",
            version
        )));
    }
    let kind = r.read_u8()?;
    if kind != expected_kind {
        return Err(Error::Corruption(format!(
            "unexpected payload kind {:?}, expected {:?}",
            kind as char, expected_kind as char
        )));
    }
    read_len(r)
}

fn ensure_consumed(rest: &[u8]) -> Result<()> {
    if rest.is_empty() {
        Ok(())
    } else {
        Err(Error::Corruption(format!(
            "{} trailing bytes after payload",
            rest.len()
        )))
    }
}

// =============================================================================
// Nodes
// =============================================================================

fn write_action<W: Write>(w: &mut W, action: &ActionNode) -> Result<()> {
    w.write_u32::<LittleEndian>(action.action_id.0)?;
    w.write_u8(action.action_type.tag())?;
    write_str(w, &action.entity_full_name)?;
    write_str(w, &action.provider_name)?;
    write_parameters(w, &action.parameters)?;

    write_flag(w, action.conditional.is_some())?;
    if let Some(cond) = &action.conditional {
        write_conditional(w, cond)?;
    }

    write_flag(w, action.query.is_some())?;
    if let Some(query) = &action.query {
        write_query(w, query)?;
    }

    write_flag(w, action.stored_procedure_name.is_some())?;
    if let Some(name) = &action.stored_procedure_name {
        write_str(w, name)?;
    }

    write_flag(w, action.row_version.is_some())?;
    if let Some(rv) = action.row_version {
        w.write_u64::<LittleEndian>(rv)?;
    }

    w.write_u32::<LittleEndian>(action.command_timeout)?;

    for children in [
        &action.before_actions,
        &action.after_actions,
        &action.alternative_actions,
    ] {
        write_flag(w, true)?;
        write_len(w, children.len())?;
        for child in children {
            write_action(w, child)?;
        }
    }
    Ok(())
}

fn read_action<R: Read>(r: &mut R, depth: usize) -> Result<ActionNode> {
    check_depth(depth)?;

    let action_id = ActionId(r.read_u32::<LittleEndian>()?);
    let tag = r.read_u8()?;
    let action_type = ActionType::from_tag(tag)
        .ok_or_else(|| Error::Corruption(format!("unknown action type tag {}", tag)))?;
    let entity_full_name = read_str(r)?;
    let provider_name = read_str(r)?;
    let parameters = read_parameters(r)?;

    let conditional = if read_flag(r)? {
        Some(read_conditional(r, depth + 1)?)
    } else {
        None
    };
    let query = if read_flag(r)? {
        Some(read_query(r, depth + 1)?)
    } else {
        None
    };
    let stored_procedure_name = if read_flag(r)? {
        Some(read_str(r)?)
    } else {
        None
    };
    let row_version = if read_flag(r)? {
        Some(r.read_u64::<LittleEndian>()?)
    } else {
        None
    };
    let command_timeout = r.read_u32::<LittleEndian>()?;

    let before_actions = read_children(r, |r| read_action(r, depth + 1))?;
    let after_actions = read_children(r, |r| read_action(r, depth + 1))?;
    let alternative_actions = read_children(r, |r| read_action(r, depth + 1))?;

    Ok(ActionNode {
        action_id,
        action_type,
        entity_full_name,
        provider_name,
        parameters,
        conditional,
        query,
        stored_procedure_name,
        row_version,
        command_timeout,
        before_actions,
        after_actions,
        alternative_actions,
    })
}

fn write_result<W: Write>(w: &mut W, result: &ResultNode) -> Result<()> {
    w.write_u32::<LittleEndian>(result.action_id.0)?;
    write_flag(w, result.success)?;

    write_flag(w, result.failure_message.is_some())?;
    if let Some(message) = &result.failure_message {
        write_str(w, message)?;
    }

    w.write_u64::<LittleEndian>(result.affected_rows)?;
    w.write_u64::<LittleEndian>(result.row_version)?;
    write_parameters(w, &result.parameters)?;

    write_flag(w, result.result.is_some())?;
    if let Some(value) = &result.result {
        write_value(w, value)?;
    }

    for children in [
        &result.before_actions,
        &result.after_actions,
        &result.alternative_actions,
    ] {
        write_flag(w, true)?;
        write_len(w, children.len())?;
        for child in children {
            write_result(w, child)?;
        }
    }
    Ok(())
}

fn read_result<R: Read>(r: &mut R, depth: usize) -> Result<ResultNode> {
    check_depth(depth)?;

    let action_id = ActionId(r.read_u32::<LittleEndian>()?);
    let success = read_flag(r)?;
    let failure_message = if read_flag(r)? {
        Some(read_str(r)?)
    } else {
        None
    };
    let affected_rows = r.read_u64::<LittleEndian>()?;
    let row_version = r.read_u64::<LittleEndian>()?;
    let parameters = read_parameters(r)?;
    let result = if read_flag(r)? {
        Some(read_value(r)?)
    } else {
        None
    };

    let before_actions = read_children(r, |r| read_result(r, depth + 1))?;
    let after_actions = read_children(r, |r| read_result(r, depth + 1))?;
    let alternative_actions = read_children(r, |r| read_result(r, depth + 1))?;

    Ok(ResultNode {
        action_id,
        success,
        failure_message,
        affected_rows,
        row_version,
        parameters,
        result,
        before_actions,
        after_actions,
        alternative_actions,
    })
}

fn read_children<R: Read, T>(
    r: &mut R,
    mut read_one: impl FnMut(&mut R) -> Result<T>,
) -> Result<Vec<T>> {
    if !read_flag(r)? {
        return Ok(Vec::new());
    }
    let count = read_len(r)?;
    let mut out = Vec::with_capacity(count.min(MAX_PREALLOC));
    for _ in 0..count {
        out.push(read_one(r)?);
    }
    Ok(out)
}

fn check_depth(depth: usize) -> Result<()> {
    if depth > MAX_DECODE_DEPTH {
        return Err(Error::Corruption(format!(
            "nesting deeper than {} levels",
            MAX_DECODE_DEPTH
        )));
    }
    Ok(())
}

// =============================================================================
// Parameters, conditionals, queries
// =============================================================================

fn write_parameters<W: Write>(w: &mut W, parameters: &[Parameter]) -> Result<()> {
    write_flag(w, true)?;
    write_len(w, parameters.len())?;
    for p in parameters {
        write_str(w, &p.name)?;
        w.write_u8(p.direction.tag())?;
        write_value(w, &p.value)?;
    }
    Ok(())
}

fn read_parameters<R: Read>(r: &mut R) -> Result<Vec<Parameter>> {
    read_children(r, |r| {
        let name = read_str(r)?;
        let tag = r.read_u8()?;
        let direction = ParameterDirection::from_tag(tag)
            .ok_or_else(|| Error::Corruption(format!("unknown parameter direction {}", tag)))?;
        let value = read_value(r)?;
        Ok(Parameter {
            name,
            value,
            direction,
        })
    })
}

fn write_conditional<W: Write>(w: &mut W, cond: &Conditional) -> Result<()> {
    match cond {
        Conditional::Condition {
            property,
            operator,
            value,
        } => {
            w.write_u8(COND_CONDITION)?;
            write_str(w, property)?;
            w.write_u8(operator.tag())?;
            write_value(w, value)?;
        }
        Conditional::Group { operator, terms } => {
            w.write_u8(COND_GROUP)?;
            w.write_u8(match operator {
                LogicalOperator::And => 0,
                LogicalOperator::Or => 1,
            })?;
            write_len(w, terms.len())?;
            for term in terms {
                write_conditional(w, term)?;
            }
        }
        Conditional::Not(inner) => {
            w.write_u8(COND_NOT)?;
            write_conditional(w, inner)?;
        }
    }
    Ok(())
}

fn read_conditional<R: Read>(r: &mut R, depth: usize) -> Result<Conditional> {
    check_depth(depth)?;
    match r.read_u8()? {
        COND_CONDITION => {
            let property = read_str(r)?;
            let tag = r.read_u8()?;
            let operator = ComparisonOperator::from_tag(tag)
                .ok_or_else(|| Error::Corruption(format!("unknown comparison operator {}", tag)))?;
            let value = read_value(r)?;
            Ok(Conditional::Condition {
                property,
                operator,
                value,
            })
        }
        COND_GROUP => {
            let operator = match r.read_u8()? {
                0 => LogicalOperator::And,
                1 => LogicalOperator::Or,
                other => {
                    return Err(Error::Corruption(format!(
                        "unknown logical operator {}",
                        other
                    )))
                }
            };
            let count = read_len(r)?;
            let mut terms = Vec::with_capacity(count.min(MAX_PREALLOC));
            for _ in 0..count {
                terms.push(read_conditional(r, depth + 1)?);
            }
            Ok(Conditional::Group { operator, terms })
        }
        COND_NOT => Ok(Conditional::Not(Box::new(read_conditional(r, depth + 1)?))),
        other => Err(Error::Corruption(format!(
            "unknown conditional tag {}",
            other
        ))),
    }
}

fn write_query<W: Write>(w: &mut W, query: &QueryInfo) -> Result<()> {
    write_str(w, &query.entity_full_name)?;
    write_flag(w, query.filter.is_some())?;
    if let Some(filter) = &query.filter {
        write_conditional(w, filter)?;
    }
    write_flag(w, query.take.is_some())?;
    if let Some(take) = query.take {
        w.write_u32::<LittleEndian>(take)?;
    }
    Ok(())
}

fn read_query<R: Read>(r: &mut R, depth: usize) -> Result<QueryInfo> {
    let entity_full_name = read_str(r)?;
    let filter = if read_flag(r)? {
        Some(read_conditional(r, depth + 1)?)
    } else {
        None
    };
    let take = if read_flag(r)? {
        Some(r.read_u32::<LittleEndian>()?)
    } else {
        None
    };
    Ok(QueryInfo {
        entity_full_name,
        filter,
        take,
    })
}

// =============================================================================
// Primitives
// =============================================================================

fn write_value<W: Write>(w: &mut W, value: &Value) -> Result<()> {
    w.write_u8(value.kind().tag())?;
    match value {
        Value::Null => {}
        Value::Bool(b) => write_flag(w, *b)?,
        Value::Int(i) => w.write_i64::<LittleEndian>(*i)?,
        Value::Float(f) => w.write_f64::<LittleEndian>(*f)?,
        Value::String(s) => write_str(w, s)?,
        Value::Bytes(b) => {
            write_len(w, b.len())?;
            w.write_all(b)?;
        }
    }
    Ok(())
}

fn read_value<R: Read>(r: &mut R) -> Result<Value> {
    let tag = r.read_u8()?;
    let kind = ValueKind::from_tag(tag)
        .ok_or_else(|| Error::Corruption(format!("unknown value tag {}", tag)))?;
    Ok(match kind {
        ValueKind::Null => Value::Null,
        ValueKind::Bool => Value::Bool(read_flag(r)?),
        ValueKind::Int => Value::Int(r.read_i64::<LittleEndian>()?),
        ValueKind::Float => Value::Float(r.read_f64::<LittleEndian>()?),
        ValueKind::String => Value::String(read_str(r)?),
        ValueKind::Bytes => Value::Bytes(read_bytes(r)?),
    })
}

fn write_flag<W: Write>(w: &mut W, flag: bool) -> Result<()> {
    w.write_u8(u8::from(flag))?;
    Ok(())
}

fn read_flag<R: Read>(r: &mut R) -> Result<bool> {
    match r.read_u8()? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(Error::Corruption(format!("invalid flag byte {}", other))),
    }
}

fn write_len<W: Write>(w: &mut W, len: usize) -> Result<()> {
    let len = u32::try_from(len)
        .map_err(|_| Error::InvalidInput(format!("length {} exceeds u32", len)))?;
    w.write_u32::<LittleEndian>(len)?;
    Ok(())
}

fn read_len<R: Read>(r: &mut R) -> Result<usize> {
    Ok(r.read_u32::<LittleEndian>()? as usize)
}

fn write_str<W: Write>(w: &mut W, s: &str) -> Result<()> {
    write_len(w, s.len())?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

fn read_bytes<R: Read>(r: &mut R) -> Result<Vec<u8>> {
    let len = read_len(r)?;
    let mut buf = Vec::with_capacity(len.min(MAX_PREALLOC * 64));
    (&mut *r).take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(Error::Corruption(format!(
            "truncated payload: expected {} bytes, found {}",
            len,
            buf.len()
        )));
    }
    Ok(buf)
}

fn read_str<R: Read>(r: &mut R) -> Result<String> {
    let bytes = read_bytes(r)?;
    String::from_utf8(bytes).map_err(|e| Error::Corruption(format!("invalid UTF-8: {}", e)))
}
