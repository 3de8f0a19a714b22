//! Conversion between host values and VM values.
//!
//! Primitives map onto the VM's own types. Entity and object references are
//! userdata with `__eq` and `__tostring`, so scripts can compare and print
//! them but never forge one.

use rlua::{Lua, UserData, UserDataMethods, Value};

use canvasc_core::{DataType, Datum, EntityId, ObjectRef, StaticValue};

/// Entity reference as seen by scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LuaEntity(pub EntityId);

/// Host object reference as seen by scripts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LuaObject(pub ObjectRef);

impl UserData for LuaEntity {
    fn add_methods<'lua, M: UserDataMethods<'lua, Self>>(methods: &mut M) {
        methods.add_meta_method("__eq", |_, this, other: Value| {
            Ok(match other {
                Value::UserData(ud) => ud.borrow::<LuaEntity>().map(|o| o.0 == this.0).unwrap_or(false),
                _ => false,
            })
        });
        methods.add_meta_method("__tostring", |_, this, ()| Ok(format!("entity({})", this.0)));
    }
}

impl UserData for LuaObject {
    fn add_methods<'lua, M: UserDataMethods<'lua, Self>>(methods: &mut M) {
        methods.add_meta_method("__eq", |_, this, other: Value| {
            Ok(match other {
                Value::UserData(ud) => ud.borrow::<LuaObject>().map(|o| o.0 == this.0).unwrap_or(false),
                _ => false,
            })
        });
        methods.add_meta_method("__tostring", |_, this, ()| {
            Ok(format!("{}#{}", this.0.class, this.0.handle))
        });
    }
}

/// Converts a host value into a VM value.
pub fn to_lua<'lua>(lua: &'lua Lua, datum: &Datum) -> rlua::Result<Value<'lua>> {
    Ok(match datum {
        Datum::Boolean(b) => Value::Boolean(*b),
        Datum::Number(n) => Value::Number(*n),
        Datum::String(s) => Value::String(lua.create_string(s)?),
        Datum::EntityId(id) => Value::UserData(lua.create_userdata(LuaEntity(*id))?),
        Datum::Object(obj) => Value::UserData(lua.create_userdata(LuaObject(obj.clone()))?),
    })
}

/// Converts a static constant into a VM value. Lists become sequences and
/// lookups become string-keyed tables.
pub fn static_to_lua<'lua>(lua: &'lua Lua, value: &StaticValue) -> rlua::Result<Value<'lua>> {
    Ok(match value {
        StaticValue::Number(n) => Value::Number(*n),
        StaticValue::Text(s) => Value::String(lua.create_string(s)?),
        StaticValue::NumberList(items) => Value::Table(lua.create_sequence_from(items.iter().copied())?),
        StaticValue::TextList(items) => {
            Value::Table(lua.create_sequence_from(items.iter().map(String::as_str))?)
        }
        StaticValue::Lookup(entries) => {
            let table = lua.create_table_with_capacity(0, entries.len() as _)?;
            for (key, value) in entries {
                table.set(key.as_str(), *value)?;
            }
            Value::Table(table)
        }
    })
}

/// Converts a VM value into a host value of type `ty`.
///
/// On mismatch the error carries the name of the type actually found.
pub fn from_lua(value: &Value, ty: &DataType) -> Result<Datum, String> {
    let datum = match (ty, value) {
        (DataType::Boolean, Value::Boolean(b)) => Some(Datum::Boolean(*b)),
        (DataType::Number, Value::Number(n)) => Some(Datum::Number(*n)),
        (DataType::Number, Value::Integer(i)) => Some(Datum::Number(*i as f64)),
        (DataType::String, Value::String(s)) => s.to_str().ok().map(|s| Datum::String(s.to_string())),
        (DataType::EntityId, Value::UserData(ud)) => {
            ud.borrow::<LuaEntity>().ok().map(|e| Datum::EntityId(e.0))
        }
        (DataType::Object(class), Value::UserData(ud)) => ud
            .borrow::<LuaObject>()
            .ok()
            .filter(|o| o.0.class == *class)
            .map(|o| Datum::Object(o.0.clone())),
        _ => None,
    };
    datum.ok_or_else(|| type_name(value))
}

/// Converts a VM value into a host value of whatever type it carries.
/// Returns `None` for values with no host counterpart (nil, tables,
/// functions).
pub fn infer(value: &Value) -> Option<Datum> {
    match value {
        Value::Boolean(b) => Some(Datum::Boolean(*b)),
        Value::Number(n) => Some(Datum::Number(*n)),
        Value::Integer(i) => Some(Datum::Number(*i as f64)),
        Value::String(s) => s.to_str().ok().map(|s| Datum::String(s.to_string())),
        Value::UserData(ud) => {
            if let Ok(entity) = ud.borrow::<LuaEntity>() {
                Some(Datum::EntityId(entity.0))
            } else if let Ok(object) = ud.borrow::<LuaObject>() {
                Some(Datum::Object(object.0.clone()))
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Host-facing type name of a VM value.
pub fn type_name(value: &Value) -> String {
    match value {
        Value::Integer(_) | Value::Number(_) => "number".to_string(),
        Value::String(s) if s.to_str().is_err() => "non-utf8 string".to_string(),
        Value::UserData(ud) => {
            if ud.borrow::<LuaEntity>().is_ok() {
                "EntityId".to_string()
            } else if let Ok(object) = ud.borrow::<LuaObject>() {
                format!("Object<{}>", object.0.class)
            } else {
                "userdata".to_string()
            }
        }
        other => other.type_name().to_string(),
    }
}

/// Text form of a VM value for log lines.
pub fn display(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::String(s) => s.to_string_lossy().into_owned(),
        other => match infer(other) {
            Some(Datum::Boolean(b)) => b.to_string(),
            Some(Datum::Number(n)) => n.to_string(),
            Some(Datum::EntityId(id)) => format!("entity({id})"),
            Some(Datum::Object(obj)) => format!("{}#{}", obj.class, obj.handle),
            _ => format!("<{}>", other.type_name()),
        },
    }
}
