use crate::{
    attestation::{self, Authority},
    command::{Command, Params, Request, Response},
    dispatch::{Engine, Handler, Outgoing},
    provisioning::{self, Metadata, WrappedKey},
    registry::{Connection, Registry},
    Config, Error,
};
use bytes::Bytes;
use tracing::{debug, info, trace, warn};
use trustlet_cryptography::{Provider, Tag};

/// A trusted endpoint holding a module key and a registry of peer connections.
///
/// All state is owned by the module and mutated through `&mut self`, so invocations are processed
/// one at a time.
pub struct Module<P: Provider> {
    config: Config,
    provider: P,
    client: attestation::Client,
    registry: Registry,
    engine: Engine,
}

impl<P: Provider> Module<P> {
    /// Create a module that has not yet fetched its module key.
    pub fn new(provider: P, config: Config) -> Self {
        Self {
            config,
            provider,
            client: attestation::Client::new(),
            registry: Registry::new(),
            engine: Engine::new(),
        }
    }

    /// Fetch the module key from `authority`.
    ///
    /// The module cannot provision connections or answer challenges until this succeeds.
    pub fn start<A: Authority>(&mut self, authority: &mut A) -> Result<(), Error> {
        self.client.fetch_module_key(authority)?;
        info!("module started");
        Ok(())
    }

    /// Register the handler for `channel`.
    pub fn register<H: Handler + 'static>(&mut self, channel: u16, handler: H) {
        if self.engine.register(channel, handler).is_some() {
            debug!(channel_id = channel, "replaced channel handler");
        }
    }

    /// Provision a connection from a wrapped session key.
    pub fn provision(&mut self, message: &WrappedKey) -> Result<Metadata, Error> {
        let module_key = self.client.module_key()?;
        provisioning::provision(
            &self.provider,
            &self.config,
            module_key,
            &mut self.registry,
            message,
        )
    }

    /// Answer an attestation challenge, returning the proof tag.
    pub fn attest(&self, challenge: &[u8]) -> Result<Tag, Error> {
        let sealed = self
            .client
            .respond_to_challenge(&self.provider, &self.config, challenge)?;
        Ok(sealed.tag)
    }

    /// Decrypt a command for `connection_id` and route it to its channel handler.
    pub fn dispatch(
        &mut self,
        connection_id: u16,
        ciphertext: &[u8],
        tag: &[u8],
    ) -> Result<(), Error> {
        self.engine.dispatch(
            &self.provider,
            &self.config,
            &mut self.registry,
            connection_id,
            ciphertext,
            tag,
        )
    }

    /// Seal `data` for every live connection bound to `channel`.
    pub fn emit(&mut self, channel: u16, data: &[u8]) -> Result<Vec<Outgoing>, Error> {
        self.engine.emit(
            &self.provider,
            &self.config,
            &mut self.registry,
            channel,
            data,
        )
    }

    /// Drop a connection, zeroizing its session key.
    pub fn revoke(&mut self, connection_id: u16) -> Result<(), Error> {
        let connection: Connection = self
            .registry
            .remove(connection_id)
            .ok_or(Error::UnknownConnection(connection_id))?;
        info!(
            connection_id,
            channel_id = connection.channel(),
            "revoked connection"
        );
        Ok(())
    }

    /// Execute a raw invocation from the host.
    ///
    /// The command identifier and parameter shape are validated before any state is touched.
    pub fn invoke(&mut self, command: u32, params: Params) -> Result<Response, Error> {
        let command = Command::try_from(command).inspect_err(|err| {
            warn!(?err, "rejected invocation");
        })?;
        let request = Request::parse(command, params).inspect_err(|err| {
            warn!(?command, ?err, "rejected invocation");
        })?;
        trace!(?command, "invoking");
        let result = match request {
            Request::SetKey(message) => self.provision(&message).map(|_| Response::Empty),
            Request::Attest { challenge } => self
                .attest(&challenge)
                .map(|tag| Response::Output(Bytes::copy_from_slice(&tag))),
            Request::HandleInput {
                connection_id,
                ciphertext,
                tag,
            } => self
                .dispatch(connection_id, &ciphertext, &tag)
                .map(|_| Response::Empty),
            Request::Entry => Ok(Response::Empty),
        };
        if let Err(err) = &result {
            debug!(?command, ?err, status = err.status(), "invocation failed");
        }
        result
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Connections provisioned so far.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
