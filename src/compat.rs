//! Compatibility shims injected into pages that load scripts written for newer
//! JavaScript runtimes than the one doing the rendering.

use regex::Regex;
use serde::Deserialize;
use std::fmt;
use std::sync::LazyLock;

static SCRIPT_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^https?://[^?#]+\.js(?:[?#].*)?$").expect("static regex")
});

/// Whether a sub-resource request should trigger shim injection.
pub fn is_script_request(url: &str) -> bool {
    SCRIPT_URL.is_match(url)
}

/// A named polyfill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompatShim {
    FunctionBind,
    PromiseFinally,
    ObjectAssign,
}

impl CompatShim {
    pub const ALL: [CompatShim; 3] = [
        CompatShim::FunctionBind,
        CompatShim::PromiseFinally,
        CompatShim::ObjectAssign,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CompatShim::FunctionBind => "function-bind",
            CompatShim::PromiseFinally => "promise-finally",
            CompatShim::ObjectAssign => "object-assign",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    /// Idempotent: each script checks for the feature before defining it.
    pub fn source(&self) -> &'static str {
        match self {
            CompatShim::FunctionBind => FUNCTION_BIND,
            CompatShim::PromiseFinally => PROMISE_FINALLY,
            CompatShim::ObjectAssign => OBJECT_ASSIGN,
        }
    }
}

impl fmt::Display for CompatShim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const FUNCTION_BIND: &str = r#"(function(){
if (Function.prototype.bind) return;
Function.prototype.bind = function(ctx) {
  if (typeof this !== "function") throw new TypeError("bind target is not callable");
  var fn = this, bound = Array.prototype.slice.call(arguments, 1);
  var noop = function(){};
  var wrapper = function() {
    return fn.apply(this instanceof noop ? this : ctx,
      bound.concat(Array.prototype.slice.call(arguments)));
  };
  if (fn.prototype) noop.prototype = fn.prototype;
  wrapper.prototype = new noop();
  return wrapper;
};
})();"#;

const PROMISE_FINALLY: &str = r#"(function(){
if (typeof Promise !== "function" || Promise.prototype.finally) return;
Promise.prototype.finally = function(cb) {
  var P = this.constructor;
  return this.then(
    function(v){ return P.resolve(cb()).then(function(){ return v; }); },
    function(e){ return P.resolve(cb()).then(function(){ throw e; }); });
};
})();"#;

const OBJECT_ASSIGN: &str = r#"(function(){
if (typeof Object.assign === "function") return;
Object.assign = function(target) {
  if (target == null) throw new TypeError("Cannot convert undefined or null to object");
  var to = Object(target);
  for (var i = 1; i < arguments.length; i++) {
    var src = arguments[i];
    if (src == null) continue;
    for (var key in src) {
      if (Object.prototype.hasOwnProperty.call(src, key)) to[key] = src[key];
    }
  }
  return to;
};
})();"#;
