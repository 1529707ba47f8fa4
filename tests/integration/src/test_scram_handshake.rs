//! SCRAM handshakes against a scripted broker.

#[cfg(test)]
mod tests {
    use msk_sasl::{
        ErrorKind, Mechanism, MechanismKind, SaslContext, ScramHash, ScramMechanism,
    };

    use crate::{HandshakeFailure, ScriptedBroker, drive, init_tracing};

    const CLIENT_NONCE: &str = "rOprNGfwEbeRWgbNEkqO";
    const CLIENT_FIRST: &str = "n,,n=user,r=rOprNGfwEbeRWgbNEkqO";
    const SERVER_FIRST: &str =
        "r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096";
    const CLIENT_FINAL: &str = "c=biws,r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,p=dHzbZapWIk4jUhN+Ute9ytag9zjfMHgsqmmiz7AndVQ=";
    const SERVER_FINAL: &str = "v=6rriTRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4=";

    async fn begun(password: &str) -> ScramMechanism {
        init_tracing();
        let mut m = ScramMechanism::new(ScramHash::Sha256).with_client_nonce(CLIENT_NONCE);
        m.begin(&SaslContext::new(), "user", password, "").await.unwrap();
        m
    }

    #[tokio::test]
    async fn test_should_complete_scram_sha256_exchange() {
        let mut m = begun("pencil").await;
        let mut broker = ScriptedBroker::default()
            .expect(CLIENT_FIRST, SERVER_FIRST)
            .expect(CLIENT_FINAL, SERVER_FINAL);

        drive(&mut m, &SaslContext::new(), &mut broker).await.unwrap();
        assert!(m.done());
        assert_eq!(m.name(), MechanismKind::ScramSha256.name());
    }

    #[tokio::test]
    async fn test_should_be_rejected_with_wrong_password() {
        let mut m = begun("not-pencil").await;
        let mut broker = ScriptedBroker::default()
            .expect(CLIENT_FIRST, SERVER_FIRST)
            .expect(CLIENT_FINAL, SERVER_FINAL);

        let result = drive(&mut m, &SaslContext::new(), &mut broker).await;
        assert!(matches!(result, Err(HandshakeFailure::Broker(_))));
        assert!(!m.done());
    }

    #[tokio::test]
    async fn test_should_detect_impostor_server() {
        let mut m = begun("pencil").await;
        let mut broker = ScriptedBroker::default()
            .expect(CLIENT_FIRST, SERVER_FIRST)
            .expect(CLIENT_FINAL, "v=7rriTRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4=");

        let result = drive(&mut m, &SaslContext::new(), &mut broker).await;
        let err = match result {
            Err(HandshakeFailure::Client(err)) => err,
            other => panic!("expected client failure, got {other:?}"),
        };
        assert_eq!(err.kind(), ErrorKind::ChallengeValidation);
        assert!(!m.done());
    }

    #[tokio::test]
    async fn test_should_surface_broker_error_attribute() {
        let mut m = begun("pencil").await;
        let mut broker = ScriptedBroker::default()
            .expect(CLIENT_FIRST, SERVER_FIRST)
            .expect(CLIENT_FINAL, "e=other-error");

        let result = drive(&mut m, &SaslContext::new(), &mut broker).await;
        let err = match result {
            Err(HandshakeFailure::Client(err)) => err,
            other => panic!("expected client failure, got {other:?}"),
        };
        assert!(err.to_string().contains("other-error"));
    }
}
