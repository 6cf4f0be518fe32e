//! Parses the association URI that bootstraps an MWA scenario from a
//! handoff link.
//!
//! Both variants share the scheme `solana-wallet` and authority `v1`; they
//! are distinguished by the final path segment (`local` vs. `remote`)
//! rather than by host, matching the observed ecosystem convention. This
//! module only classifies and extracts the association token — it does not
//! start a transport; callers use [`AssociationUri::create_scenario`] to
//! inject whatever constructs the actual scenario.

use url::Url;

const SCHEME: &str = "solana-wallet";
const AUTHORITY: &str = "v1";

/// A parsed, validated association URI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssociationUri {
    /// `solana-wallet://v1/associate/local?association=<token>`
    Local { token: String },
    /// `solana-wallet://v1/associate/remote?association=<token>&reflector=<host>`
    Remote {
        token: String,
        reflector: Option<String>,
    },
}

impl AssociationUri {
    /// Parses `uri`, trying the local variant then the remote variant.
    /// Returns `None` if neither matches.
    pub fn parse(uri: &str) -> Option<Self> {
        let url = Url::parse(uri).ok()?;

        if url.scheme() != SCHEME || url.host_str() != Some(AUTHORITY) {
            return None;
        }

        let token = url
            .query_pairs()
            .find(|(key, _)| key == "association")
            .map(|(_, value)| value.into_owned())
            .filter(|token| !token.is_empty())?;

        let segments: Vec<&str> = url.path_segments()?.collect();

        match segments.as_slice() {
            ["associate", "local"] => Some(Self::Local { token }),
            ["associate", "remote"] => {
                let reflector = url
                    .query_pairs()
                    .find(|(key, _)| key == "reflector")
                    .map(|(_, value)| value.into_owned());
                Some(Self::Remote { token, reflector })
            }
            _ => None,
        }
    }

    /// The association token carried by this URI.
    pub fn token(&self) -> &str {
        match self {
            Self::Local { token } => token,
            Self::Remote { token, .. } => token,
        }
    }

    /// Builds a scenario by handing this URI's extracted fields to an
    /// injected factory. The factory owns starting the actual transport; this
    /// type only classifies and extracts.
    pub fn create_scenario<F, T>(&self, factory: F) -> T
    where
        F: FnOnce(&AssociationUri) -> T,
    {
        factory(self)
    }
}
