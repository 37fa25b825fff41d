use serde::{Deserialize, Serialize};

/// Which menu, icon and update behaviour apply to a profile.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProfileKind {
  Remote,
  Local,
  Script,
  Merge,
}

impl ProfileKind {
  /// Enhanced profiles are layered onto the active configuration instead
  /// of replacing it.
  pub fn is_enhanced(&self) -> bool {
    matches!(self, ProfileKind::Script | ProfileKind::Merge)
  }

  pub fn file_extension(&self) -> &'static str {
    match self {
      ProfileKind::Script => "js",
      _ => "yaml",
    }
  }
}

/// Stored routing defaults for fetching a subscription.
///
/// `with_proxy` routes the fetch through the system proxy, `self_proxy`
/// through the client's own mixed port. The constructors below are the only
/// way the update path builds one, and none of them sets both flags.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoutingOption {
  #[serde(default)]
  pub with_proxy: bool,
  #[serde(default)]
  pub self_proxy: bool,
}

impl RoutingOption {
  pub const NO_PROXY: RoutingOption = RoutingOption {
    with_proxy: false,
    self_proxy: false,
  };
  pub const SYSTEM_PROXY: RoutingOption = RoutingOption {
    with_proxy: true,
    self_proxy: false,
  };
  pub const SELF_PROXY: RoutingOption = RoutingOption {
    with_proxy: false,
    self_proxy: true,
  };

  /// Collapses a stored option that has both flags set (hand-edited index
  /// files) to the self proxy, which is the stronger preference.
  pub fn normalized(self) -> RoutingOption {
    if self.with_proxy && self.self_proxy {
      RoutingOption::SELF_PROXY
    } else {
      self
    }
  }

  pub fn uses_proxy(&self) -> bool {
    self.with_proxy || self.self_proxy
  }
}

/// Traffic and quota snapshot reported by a subscription.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProfileExtra {
  #[serde(default)]
  pub upload: u64,
  #[serde(default)]
  pub download: u64,
  #[serde(default)]
  pub total: u64,
  #[serde(default)]
  pub expire: u64, // epoch seconds, 0 when the subscription never expires
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProfileRecord {
  pub uid: String,
  #[serde(default = "default_profile_name")]
  pub name: String,
  #[serde(rename = "type")]
  pub kind: ProfileKind,
  #[serde(default)]
  pub url: Option<String>,
  #[serde(default)]
  pub desc: Option<String>,
  #[serde(default)]
  pub home: Option<String>, // subscription home page, remote only
  #[serde(default)]
  pub extra: Option<ProfileExtra>, // remote only, absent when the server reports no usage
  #[serde(default)]
  pub updated: u64, // epoch seconds of the last successful fetch
  #[serde(default)]
  pub option: Option<RoutingOption>,
}

pub fn default_profile_name() -> String {
  "Profile".to_string()
}

impl ProfileRecord {
  pub fn new(uid: impl Into<String>, name: impl Into<String>, kind: ProfileKind) -> Self {
    Self {
      uid: uid.into(),
      name: name.into(),
      kind,
      url: None,
      desc: None,
      home: None,
      extra: None,
      updated: 0,
      option: None,
    }
  }

  pub fn with_url(mut self, url: impl Into<String>) -> Self {
    self.url = Some(url.into());
    self
  }

  /// Only records with a url can be fetched; anything else is a local file.
  pub fn has_url(&self) -> bool {
    self.url.as_deref().is_some_and(|url| !url.is_empty())
  }

  pub fn has_home(&self) -> bool {
    self.kind == ProfileKind::Remote && self.home.as_deref().is_some_and(|h| !h.is_empty())
  }

  /// Quota and expiry are rendered only when the subscription reported them.
  pub fn has_extra(&self) -> bool {
    self.extra.is_some()
  }

  pub fn routing(&self) -> RoutingOption {
    self.option.unwrap_or_default().normalized()
  }

  pub fn file_name(&self) -> String {
    format!("{}.{}", self.uid, self.kind.file_extension())
  }
}

/// Snapshot returned by the command layer: the ordered records plus which
/// ordinary profile is current and which enhanced profiles are enabled.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct ProfileList {
  #[serde(default)]
  pub current: Option<String>,
  #[serde(default)]
  pub chain: Vec<String>,
  #[serde(default)]
  pub items: Vec<ProfileRecord>,
}

impl ProfileList {
  pub fn find(&self, uid: &str) -> Option<&ProfileRecord> {
    self.items.iter().find(|item| item.uid == uid)
  }

  pub fn find_mut(&mut self, uid: &str) -> Option<&mut ProfileRecord> {
    self.items.iter_mut().find(|item| item.uid == uid)
  }

  pub fn position(&self, uid: &str) -> Option<usize> {
    self.items.iter().position(|item| item.uid == uid)
  }
}

/// Fields the info editor may change.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct ProfileInfoPatch {
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default)]
  pub desc: Option<String>,
  #[serde(default)]
  pub url: Option<String>,
  #[serde(default)]
  pub option: Option<RoutingOption>,
}
